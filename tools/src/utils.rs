use anyhow::{anyhow, bail, Result};
use matnpz::sidecar::ExperimentMetadata;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

pub fn iter_files<'a, I>(
    paths: I,
    recursive: bool,
    extensions: &'a [&'static str],
) -> impl Iterator<Item = DirEntry> + 'a
where
    I: IntoIterator + 'a,
    <I as IntoIterator>::Item: AsRef<Path>,
{
    paths
        .into_iter()
        .flat_map(move |path| {
            let mut walk_dir = WalkDir::new(path.as_ref()).sort_by_file_name();
            if !recursive {
                walk_dir = walk_dir.max_depth(1);
            }

            walk_dir
        })
        .filter_map(Result::ok)
        .filter(|entry| {
            entry.file_type().is_file()
                && !is_hidden(entry)
                && extensions
                    .iter()
                    .any(|extension| has_extension(entry.path(), extension))
        })
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

pub fn has_extension(path: &Path, extension: &str) -> bool {
    match path.extension() {
        Some(ext) => ext.eq_ignore_ascii_case(extension),
        None => false,
    }
}

/// Parse a `KEY=VALUE` sidecar metadata argument
pub fn parse_key_value(argument: &str) -> Result<(String, String)> {
    let (key, value) = match argument.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => (key.trim(), value),
        _ => return Err(anyhow!("Expected KEY=VALUE, got '{argument}'")),
    };

    if ExperimentMetadata::is_reserved(key) {
        bail!("'{key}' is set by the converter and cannot be given as metadata");
    }

    Ok((key.to_owned(), value.to_owned()))
}
