use anyhow::Result;
use matnpz::{
    canonical::Quantity,
    convert::{Batch, BatchError, Conversion, ConvertOptions, ErrorKind},
    join::{extract, verify, SplitArchive},
    mat::{CellArray, Compression, Header, MatFile, StructArray, Value, Variable},
    sidecar::Sidecar,
};
use ndarray::{arr1, Array0, Array1};
use ndarray_npy::ReadNpyExt;
use std::{
    fs::{self, File},
    io::{Cursor, Write},
    path::Path,
};
use tempfile::tempdir;
use zip::{write::FileOptions, ZipArchive, ZipWriter};

fn recording() -> MatFile {
    MatFile::new(vec![
        Variable::new("Voltage", vec![1.0, 2.0]),
        Variable::new("Current", vec![0.1, 0.2]),
        Variable::new("Fs", 1000.0),
    ])
}

/// Append an uncompressed data element, padded to 8 bytes
fn push_element(buffer: &mut Vec<u8>, data_type: u32, bytes: &[u8]) {
    buffer.extend_from_slice(&data_type.to_le_bytes());
    buffer.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buffer.extend_from_slice(bytes);
    buffer.resize(buffer.len() + (8 - bytes.len() % 8) % 8, 0);
}

/// A MAT-file holding one struct that claims `i32::MAX` by `i32::MAX` elements
fn oversized_struct() -> Result<Vec<u8>> {
    let mut matrix = Vec::new();
    push_element(&mut matrix, 6, &[2, 0, 0, 0, 0, 0, 0, 0]);

    let dims: Vec<u8> = [i32::MAX, i32::MAX].iter().flat_map(|dim| dim.to_le_bytes()).collect();
    push_element(&mut matrix, 5, &dims);
    push_element(&mut matrix, 1, b"meas");
    push_element(&mut matrix, 5, &8_i32.to_le_bytes());
    push_element(&mut matrix, 1, &[]);

    let mut bytes = Vec::new();
    Header::default().to_writer(&mut bytes)?;
    push_element(&mut bytes, 14, &matrix);
    Ok(bytes)
}

fn entries(npz: &Path) -> Result<Vec<String>> {
    let zip = ZipArchive::new(File::open(npz)?)?;
    Ok(zip.file_names().map(str::to_owned).collect())
}

#[test]
fn converts_a_recording() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("pinknoise_5Hz-2000Hz_8Vrms.mat");
    recording().to_path(&input, Compression::Zlib)?;

    let conversion = Conversion::new(
        &input,
        dir.path().join("numpy_datasets"),
        "ExpD",
        "pinknoise_5Hz-2000Hz_8Vrms",
    );
    let converted = conversion.run(&ConvertOptions::default())?;

    assert_eq!(
        converted.npz_path,
        dir.path()
            .join("numpy_datasets/ExpD/pinknoise_5Hz-2000Hz_8Vrms.npz")
    );

    let mut zip = ZipArchive::new(File::open(&converted.npz_path)?)?;
    let voltage = Array1::<f64>::read_npy(zip.by_name("voltage.npy")?)?;
    let current = Array1::<f64>::read_npy(zip.by_name("current.npy")?)?;
    let sample_rate = Array0::<f64>::read_npy(zip.by_name("sample_rate.npy")?)?;

    assert_eq!(voltage, arr1(&[1.0, 2.0]));
    assert_eq!(current, arr1(&[0.1, 0.2]));
    assert_eq!(sample_rate.into_scalar(), 1000.0);

    let sidecar = Sidecar::from_path(&converted.sidecar_path)?;
    let names: Vec<_> = sidecar.arrays.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["current", "sample_rate", "voltage"]);
    assert_eq!(sidecar.arrays["voltage"].shape, vec![2]);
    assert_eq!(sidecar.arrays["voltage"].unit.as_deref(), Some("V"));
    assert_eq!(sidecar.arrays["sample_rate"].shape, Vec::<usize>::new());
    assert_eq!(sidecar.arrays["sample_rate"].source_field, "Fs");
    assert_eq!(sidecar.npz_file, converted.npz_path);
    assert_eq!(sidecar.source_file, input);

    let excitation = sidecar.experiment_metadata.excitation.unwrap();
    assert_eq!(excitation.band_hz, Some([5.0, 2000.0]));
    assert_eq!(excitation.level_vrms, Some(8.0));

    Ok(())
}

#[test]
fn archive_and_sidecar_agree() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("sweep.mat");

    let laser = StructArray::scalar([("Velocity", Value::from(vec![0.0, 0.5, 0.25]))]);
    let meas = StructArray::scalar([
        ("U", Value::from(vec![1.0, -1.0, 1.0])),
        ("I", Value::from(vec![0.1, -0.1, 0.1])),
        ("SampleRate", Value::from(48000.0)),
        ("Force_N", Value::from(vec![3.0, 2.0, 1.0])),
        ("Operator", Value::from("jd")),
        ("Laser", laser.into()),
        ("Notes", CellArray::row(vec![Value::from("warm-up"), Value::from("run")]).into()),
    ]);
    MatFile::new(vec![Variable::new("meas", meas)]).to_path(&input, Compression::None)?;

    let converted = Conversion::new(&input, dir.path(), "ExpA", "sweep")
        .run(&ConvertOptions::default())?;

    let mut expected = vec![
        "Laser_Velocity",
        "Notes_0",
        "Notes_1",
        "Operator",
        "current",
        "force_N",
        "sample_rate",
        "voltage",
    ];
    expected.sort_unstable();

    let names: Vec<_> = converted.sidecar.arrays.keys().map(String::as_str).collect();
    assert_eq!(names, expected);

    let mut files = entries(&converted.npz_path)?;
    files.sort();
    let expected_files: Vec<_> = expected.iter().map(|name| format!("{name}.npy")).collect();
    assert_eq!(files, expected_files);

    assert_eq!(converted.sidecar.arrays["force_N"].unit.as_deref(), Some("N"));
    assert_eq!(converted.sidecar.arrays["Operator"].dtype, "<U2");
    assert_eq!(converted.sidecar.arrays["Operator"].unit, None);
    assert_eq!(converted.sidecar.arrays["Notes_0"].source_field, "meas.Notes{1}");

    Ok(())
}

#[test]
fn existing_outputs_are_left_alone() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("rec.mat");
    recording().to_path(&input, Compression::Zlib)?;

    let conversion = Conversion::new(&input, dir.path().join("out"), "ExpD", "rec");
    conversion.run(&ConvertOptions::default())?;

    let npz = fs::read(conversion.npz_path())?;
    let json = fs::read(conversion.sidecar_path())?;

    let error = conversion.run(&ConvertOptions::default()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::AlreadyExists);

    assert_eq!(fs::read(conversion.npz_path())?, npz);
    assert_eq!(fs::read(conversion.sidecar_path())?, json);

    // Only the sidecar being present is enough to refuse
    fs::remove_file(conversion.npz_path())?;
    let error = conversion.run(&ConvertOptions::default()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::AlreadyExists);
    assert!(!conversion.npz_path().exists());

    Ok(())
}

#[test]
fn forced_conversion_is_idempotent() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("rec.mat");
    recording().to_path(&input, Compression::Zlib)?;

    let options = ConvertOptions {
        force: true,
        ..Default::default()
    };

    let conversion = Conversion::new(&input, dir.path().join("out"), "ExpD", "rec");
    conversion.run(&options)?;
    let first = fs::read(conversion.npz_path())?;

    conversion.run(&options)?;
    let second = fs::read(conversion.npz_path())?;
    assert_eq!(first, second);

    // No temporary files are left behind
    let files = fs::read_dir(conversion.destination_dir())?.count();
    assert_eq!(files, 2);

    Ok(())
}

#[test]
fn missing_required_quantity() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("voltage_only.mat");
    MatFile::new(vec![
        Variable::new("Voltage", vec![1.0, 2.0]),
        Variable::new("Fs", 1000.0),
    ])
    .to_path(&input, Compression::Zlib)?;

    let options = ConvertOptions {
        required: vec![Quantity::Voltage, Quantity::Current],
        ..Default::default()
    };

    let conversion = Conversion::new(&input, dir.path().join("out"), "ExpD", "voltage_only");
    let error = conversion.run(&options).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Parse);
    assert!(conversion.existing_output().is_none());

    Ok(())
}

#[test]
fn missing_input_is_an_io_error() {
    let dir = tempdir().unwrap();
    let conversion = Conversion::new(dir.path().join("nope.mat"), dir.path(), "ExpD", "nope");

    let error = conversion.run(&ConvertOptions::default()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Io);
}

#[test]
fn metadata_is_recorded() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("rec.mat");
    recording().to_path(&input, Compression::Zlib)?;

    let mut options = ConvertOptions::default();
    options
        .metadata
        .insert("amplifier_gain".to_owned(), "20".to_owned());

    let converted = Conversion::new(&input, dir.path(), "ExpD", "rec").run(&options)?;
    let sidecar = Sidecar::from_path(&converted.sidecar_path)?;

    assert_eq!(sidecar.experiment_metadata.extra["amplifier_gain"], "20");
    assert_eq!(sidecar.experiment_metadata.excitation, None);
    assert!(humantime::parse_rfc3339(&sidecar.converted_at).is_ok());

    Ok(())
}

#[test]
fn reserved_metadata_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("pinknoise_5Hz-2000Hz_8Vrms.mat");
    recording().to_path(&input, Compression::Zlib)?;

    let conversion = Conversion::new(&input, dir.path(), "ExpD", "pinknoise_5Hz-2000Hz_8Vrms");
    for key in ["experiment", "dataset_name", "excitation"] {
        let mut options = ConvertOptions::default();
        options.metadata.insert(key.to_owned(), "sine".to_owned());

        let error = conversion.run(&options).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Usage);
        assert_eq!(error.to_string(), format!("The metadata key '{key}' is reserved"));
        assert_eq!(conversion.existing_output(), None);
    }

    let converted = conversion.run(&ConvertOptions::default())?;
    let sidecar = Sidecar::from_path(&converted.sidecar_path)?;
    assert_eq!(sidecar.experiment_metadata.experiment, "ExpD");
    assert!(sidecar.experiment_metadata.excitation.is_some());

    Ok(())
}

#[test]
fn batch_survives_oversized_dimensions() -> Result<()> {
    let dir = tempdir()?;
    recording().to_path(dir.path().join("a.mat"), Compression::Zlib)?;
    fs::write(dir.path().join("b.mat"), oversized_struct()?)?;

    let summary = Batch {
        input_dir: dir.path().to_owned(),
        pattern: "*.mat".to_owned(),
        output_dir: dir.path().join("numpy_datasets"),
        experiment: "ExpD".to_owned(),
    }
    .run(&ConvertOptions::default())?;

    assert_eq!(summary.converted.len(), 1);
    assert_eq!(summary.failed.len(), 1);
    assert!(!summary.is_success());

    let (failed, error) = &summary.failed[0];
    assert_eq!(failed, &dir.path().join("b.mat"));
    assert_eq!(error.kind(), ErrorKind::Parse);

    Ok(())
}

#[test]
fn batch_carries_on_past_failures() -> Result<()> {
    let dir = tempdir()?;
    let input_dir = dir.path().join("ExpD");
    fs::create_dir(&input_dir)?;

    for name in ["a.mat", "b.mat", "d.mat"] {
        recording().to_path(input_dir.join(name), Compression::Zlib)?;
    }
    fs::write(input_dir.join("c.mat"), b"definitely not a MAT-file")?;
    fs::write(input_dir.join("notes.txt"), b"ignored")?;

    let batch = Batch {
        input_dir: input_dir.clone(),
        pattern: "*.mat".to_owned(),
        output_dir: dir.path().join("numpy_datasets"),
        experiment: "ExpD".to_owned(),
    };

    let summary = batch.run(&ConvertOptions::default())?;
    assert_eq!(summary.converted.len(), 3);
    assert_eq!(summary.failed.len(), 1);
    assert!(!summary.is_success());

    let (failed, error) = &summary.failed[0];
    assert_eq!(failed, &input_dir.join("c.mat"));
    assert_eq!(error.kind(), ErrorKind::Parse);

    let converted: Vec<_> = summary
        .converted
        .iter()
        .map(|converted| converted.sidecar.experiment_metadata.dataset_name.as_str())
        .collect();
    assert_eq!(converted, vec!["a", "b", "d"]);

    // A second run skips what is already there
    let summary = batch.run(&ConvertOptions::default())?;
    assert_eq!(summary.converted.len(), 0);
    assert_eq!(summary.skipped.len(), 3);
    assert_eq!(summary.failed.len(), 1);

    Ok(())
}

#[test]
fn batch_inputs() -> Result<()> {
    let dir = tempdir()?;
    fs::create_dir_all(dir.path().join("nested"))?;
    fs::write(dir.path().join("b.mat"), b"")?;
    fs::write(dir.path().join("a.mat"), b"")?;
    fs::write(dir.path().join("nested/c.mat"), b"")?;

    let mut batch = Batch {
        input_dir: dir.path().to_owned(),
        pattern: "*.mat".to_owned(),
        output_dir: dir.path().join("out"),
        experiment: "ExpD".to_owned(),
    };
    assert_eq!(
        batch.inputs()?,
        vec![dir.path().join("a.mat"), dir.path().join("b.mat")]
    );

    batch.pattern = "nested/*.mat".to_owned();
    assert_eq!(batch.inputs()?, vec![dir.path().join("nested/c.mat")]);

    batch.pattern = "*.npz".to_owned();
    assert!(matches!(batch.inputs(), Err(BatchError::NoMatches { .. })));

    batch.input_dir = dir.path().join("missing");
    assert!(matches!(batch.inputs(), Err(BatchError::InputDir(_))));

    Ok(())
}

#[test]
fn joined_archive_converts() -> Result<()> {
    let dir = tempdir()?;

    let mut mat = Vec::new();
    recording().to_writer(&mut mat, Compression::Zlib)?;

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("ExpD/pinknoise_5Hz-2000Hz_8Vrms.mat", FileOptions::default())?;
    zip.write_all(&mat)?;
    let bytes = zip.finish()?.into_inner();

    let parts = dir.path().join("parts");
    fs::create_dir(&parts)?;
    let half = bytes.len() / 2;
    fs::write(parts.join("dtu.zip.001"), &bytes[..half])?;
    fs::write(parts.join("dtu.zip.002"), &bytes[half..])?;

    let archive = SplitArchive::discover(&parts, None)?;
    let joined = dir.path().join(archive.joined_name());
    archive.join_to(&joined)?;
    assert_eq!(verify(&joined)?, 1);

    let raw = dir.path().join("raw");
    extract(&joined, &raw)?;

    let summary = Batch {
        input_dir: raw.join("ExpD"),
        pattern: "*.mat".to_owned(),
        output_dir: dir.path().join("numpy_datasets"),
        experiment: "ExpD".to_owned(),
    }
    .run(&ConvertOptions::default())?;

    assert!(summary.is_success());
    assert_eq!(summary.converted.len(), 1);
    assert!(dir
        .path()
        .join("numpy_datasets/ExpD/pinknoise_5Hz-2000Hz_8Vrms.json")
        .exists());

    Ok(())
}
