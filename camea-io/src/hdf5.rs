//! HDF5/NeXus scan-file and converted-artifact I/O.
//!
//! All dataset locations come from an explicit [`SchemaMap`] instead of
//! hard-coded paths or NX_class tree searches, so the same reader/writer
//! pair serves layout variants. The default map is the CAMEA layout.

use crate::error::{Error, Result};
use camea_core::{
    CalibrationSlice, CalibrationTable, ConvertedData, Sample, ScanFile, ScanMeta, UnitCell,
};
use hdf5::types::{H5Type, VarLenUnicode};
use hdf5::{Dataset, File, Group};
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3};
use std::path::Path;
use std::str::FromStr;

/// Dataset locations inside raw and converted files.
///
/// Paths under the instrument group are relative to it; all others are
/// absolute within the file.
#[derive(Debug, Clone)]
pub struct SchemaMap {
    /// Instrument group (`NXinstrument` in NeXus terms).
    pub instrument_group: String,
    /// Incident energy, relative to the instrument group.
    pub ei: String,
    /// Raw detector counts, relative to the instrument group.
    pub detector_data: String,
    /// Detector polar angles, relative to the instrument group.
    pub polar_angle: String,
    /// Sample group.
    pub sample_group: String,
    /// Sample rotation angle (A3) per scan point.
    pub rotation_angle: String,
    /// Monitor counts per scan point.
    pub monitor: String,
    /// A3 zero offset.
    pub a3_zero: String,
    /// A4 zero offset; missing means 0.
    pub a4_zero: String,
    /// Root of the per-binning calibration groups (`{n}_pixels` below it).
    pub calibration_group: String,
    /// Data group of converted artifacts.
    pub data_group: String,
    /// Reduction provenance group of converted artifacts.
    pub reduction_group: String,
    /// Scan command string.
    pub scan_command: String,
    /// Schema-variant tag dataset.
    pub definition: String,
    /// Value written to the definition dataset.
    pub definition_tag: String,
}

impl Default for SchemaMap {
    fn default() -> Self {
        Self {
            instrument_group: "entry/CAMEA".into(),
            ei: "monochromator/energy".into(),
            detector_data: "detector/data".into(),
            polar_angle: "detector/polar_angle".into(),
            sample_group: "entry/sample".into(),
            rotation_angle: "entry/sample/rotation_angle".into(),
            monitor: "entry/data/monitor".into(),
            a3_zero: "entry/zeros/A3".into(),
            a4_zero: "entry/zeros/A4".into(),
            calibration_group: "entry/calibration".into(),
            data_group: "entry/data".into(),
            reduction_group: "entry/reduction/camea_algorithm_convert".into(),
            scan_command: "entry/scancommand".into(),
            definition: "entry/definition".into(),
            definition_tag: "CAMEANXS".into(),
        }
    }
}

/// Provenance metadata recorded in converted artifacts.
#[derive(Debug, Clone)]
pub struct Provenance {
    /// Who ran the conversion.
    pub author: String,
    /// When it ran (free-form timestamp).
    pub date: String,
    /// Human-readable description of the algorithm.
    pub description: String,
}

impl Default for Provenance {
    fn default() -> Self {
        Self {
            author: "camea-rs".into(),
            date: String::new(),
            description: "Raw detector counts converted to (Qx, Qy, dE)".into(),
        }
    }
}

/// Reads a raw scan file.
///
/// The calibration table is loaded with the single slice for `binning`;
/// [`ScanFile::set_binning`] to another resolution therefore fails unless
/// the file is re-read.
///
/// # Errors
/// [`Error::MissingDataset`] if a dataset named by the schema map is absent
/// (the message carries both the file path and the dataset path),
/// [`Error::Hdf5`] for underlying format errors, [`Error::Core`] if the
/// loaded arrays violate the scan-file invariants.
pub fn read_scan(path: impl AsRef<Path>, map: &SchemaMap, binning: usize) -> Result<ScanFile> {
    let path = path.as_ref();
    let file = File::open(path)?;

    let instrument = format!("{}/", map.instrument_group);
    let ei = read_1d_f64(&file, path, &format!("{instrument}{}", map.ei))?;
    let counts = read_3d::<u32>(&file, path, &format!("{instrument}{}", map.detector_data))?;
    let a4 = read_1d_f64(&file, path, &format!("{instrument}{}", map.polar_angle))?;
    let a3 = read_1d_f64(&file, path, &map.rotation_angle)?;
    let monitor = read_1d_f64(&file, path, &map.monitor)?;
    let a3_offset = read_offset(&file, &map.a3_zero)?;
    let a4_offset = read_offset(&file, &map.a4_zero)?;
    let scan_command = read_str_opt(&file, &map.scan_command)?.unwrap_or_default();
    let temperature = match file.dataset(&format!("{}/temperature", map.sample_group)) {
        Ok(ds) => ds.read_raw::<f64>()?.first().copied(),
        Err(_) => None,
    };

    let sample = read_sample(&file, path, map)?;
    let detectors = a4.len();
    let slice = read_calibration_slice(&file, path, map, binning, detectors)?;
    let mut calibration = CalibrationTable::new();
    calibration.insert(slice);

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(ScanFile::new(
        name,
        ei,
        a3,
        a4,
        counts,
        monitor,
        a3_offset,
        a4_offset,
        binning,
        sample,
        calibration,
        scan_command,
        temperature,
    )?)
}

/// Writes a converted artifact.
///
/// The file carries the copied raw metadata, the reduction provenance
/// namespace, the six per-point data arrays (32-bit integers for intensity
/// and monitor, 32-bit floats for the rest), the calibration slice used,
/// and the schema-variant tag.
///
/// # Errors
/// [`Error::Hdf5`] if the file or any dataset cannot be created.
pub fn write_converted(
    path: impl AsRef<Path>,
    map: &SchemaMap,
    data: &ConvertedData,
    calibration: &CalibrationSlice,
    provenance: &Provenance,
) -> Result<()> {
    let file = File::create(path)?;
    let meta = data.meta();

    // Copied raw metadata.
    let instrument = ensure_group(&file, &map.instrument_group)?;
    write_1d_rel(&instrument, &map.ei, meta.ei.view())?;
    write_1d_rel(&instrument, &map.polar_angle, meta.a4.view())?;

    let sample_group = ensure_group(&file, &map.sample_group)?;
    write_str_dataset(&sample_group, "name", meta.sample.name())?;
    let cell = Array1::from_vec(meta.sample.cell().as_array().to_vec());
    write_1d(&sample_group, "unit_cell", cell.view())?;
    let orientation = Array2::from_shape_fn((2, 3), |(i, j)| meta.sample.orientation()[i][j]);
    write_2d(&sample_group, "orientation_matrix", orientation.view())?;

    write_1d_abs(&file, &map.rotation_angle, meta.a3.view())?;
    write_1d_abs(&file, &map.monitor, meta.monitor.view())?;
    write_scalar_abs(&file, &map.a3_zero, meta.a3_offset)?;
    write_scalar_abs(&file, &map.a4_zero, meta.a4_offset)?;
    write_str_abs(&file, &map.scan_command, &meta.scan_command)?;

    // Calibration slice, flattened row-per-software-pixel under `{n}_pixels`.
    let calib_parent = ensure_group(&file, &map.calibration_group)?;
    let calib = calib_parent.create_group(&format!("{}_pixels", calibration.binning()))?;
    let detectors = calibration.detectors();
    let soft = calibration.software_pixels();
    let mut ef = Array2::<f64>::zeros((detectors * soft, 4));
    let mut a4 = Array1::<f64>::zeros(detectors * soft);
    let mut edges = Array2::<f64>::zeros((detectors * soft, 2));
    for det in 0..detectors {
        for s in 0..soft {
            let row = det * soft + s;
            ef[[row, 0]] = calibration.amplitude()[[det, s]];
            ef[[row, 1]] = calibration.ef()[[det, s]];
            ef[[row, 2]] = calibration.width()[[det, s]];
            ef[[row, 3]] = calibration.background()[[det, s]];
            a4[row] = calibration.a4()[[det, s]];
            edges[[row, 0]] = calibration.lower()[[det, s]] as f64;
            edges[[row, 1]] = calibration.upper()[[det, s]] as f64;
        }
    }
    write_2d(&calib, "ef", ef.view())?;
    write_1d(&calib, "a4", a4.view())?;
    write_2d(&calib, "edges", edges.view())?;

    // Reduction provenance.
    let reduction = ensure_group(&file, &map.reduction_group)?;
    write_str_dataset(&reduction, "author", &provenance.author)?;
    write_str_dataset(&reduction, "date", &provenance.date)?;
    write_str_dataset(&reduction, "description", &provenance.description)?;
    #[allow(clippy::cast_possible_truncation)]
    let binning_value = meta.binning as u32;
    let binning_arr = Array1::from_vec(vec![binning_value]);
    write_1d(&reduction, "binning", binning_arr.view())?;

    // Converted data, fixed-width numeric types.
    let data_group = ensure_group(&file, &map.data_group)?;
    #[allow(clippy::cast_possible_truncation)]
    let intensity = data.intensity().mapv(|v| v as i32);
    #[allow(clippy::cast_possible_truncation)]
    let monitor = data.monitor().mapv(|v| v as i32);
    #[allow(clippy::cast_possible_truncation)]
    let as_f32 = |a: &Array3<f64>| a.mapv(|v| v as f32);
    write_3d(&data_group, "intensity", intensity.view())?;
    write_3d(&data_group, "monitor", monitor.view())?;
    write_3d(&data_group, "normalization", as_f32(data.normalization()).view())?;
    write_3d(&data_group, "qx", as_f32(data.qx()).view())?;
    write_3d(&data_group, "qy", as_f32(data.qy()).view())?;
    write_3d(&data_group, "en", as_f32(data.energy()).view())?;

    write_str_abs(&file, &map.definition, &map.definition_tag)?;
    Ok(())
}

/// Reads a converted artifact back into memory.
///
/// # Errors
/// [`Error::MissingDataset`] for absent datasets, [`Error::Hdf5`] for
/// format errors, [`Error::Core`] on shape disagreements.
pub fn read_converted(path: impl AsRef<Path>, map: &SchemaMap) -> Result<ConvertedData> {
    let path = path.as_ref();
    let file = File::open(path)?;

    let data = format!("{}/", map.data_group);
    let intensity = read_3d::<i32>(&file, path, &format!("{data}intensity"))?.mapv(f64::from);
    let monitor3 = read_3d::<i32>(&file, path, &format!("{data}monitor"))?.mapv(f64::from);
    let normalization =
        read_3d::<f32>(&file, path, &format!("{data}normalization"))?.mapv(f64::from);
    let qx = read_3d::<f32>(&file, path, &format!("{data}qx"))?.mapv(f64::from);
    let qy = read_3d::<f32>(&file, path, &format!("{data}qy"))?.mapv(f64::from);
    let energy = read_3d::<f32>(&file, path, &format!("{data}en"))?.mapv(f64::from);

    let instrument = format!("{}/", map.instrument_group);
    let ei = read_1d_f64(&file, path, &format!("{instrument}{}", map.ei))?;
    let a4 = read_1d_f64(&file, path, &format!("{instrument}{}", map.polar_angle))?;
    let a3 = read_1d_f64(&file, path, &map.rotation_angle)?;
    let monitor = read_1d_f64(&file, path, &map.monitor)?;
    let a3_offset = read_offset(&file, &map.a3_zero)?;
    let a4_offset = read_offset(&file, &map.a4_zero)?;
    let scan_command = read_str_opt(&file, &map.scan_command)?.unwrap_or_default();
    let sample = read_sample(&file, path, map)?;
    let binning = dataset(&file, path, &format!("{}/binning", map.reduction_group))?
        .read_raw::<u32>()?
        .first()
        .copied()
        .unwrap_or(1) as usize;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let meta = ScanMeta {
        name,
        ei,
        a3,
        a4,
        monitor,
        a3_offset,
        a4_offset,
        binning,
        sample,
        scan_command,
    };
    Ok(ConvertedData::new(
        qx,
        qy,
        energy,
        intensity,
        normalization,
        monitor3,
        meta,
    )?)
}

fn dataset(file: &File, path: &Path, name: &str) -> Result<Dataset> {
    file.dataset(name).map_err(|_| Error::MissingDataset {
        path: path.to_path_buf(),
        dataset: name.to_owned(),
    })
}

fn read_1d_f64(file: &File, path: &Path, name: &str) -> Result<Array1<f64>> {
    let values = dataset(file, path, name)?.read_raw::<f64>()?;
    Ok(Array1::from_vec(values))
}

fn read_2d<T: H5Type>(file: &File, path: &Path, name: &str) -> Result<Array2<T>> {
    let ds = dataset(file, path, name)?;
    let shape = ds.shape();
    if shape.len() != 2 {
        return Err(camea_core::Error::ShapeMismatch(format!(
            "dataset '{name}' has {} dimensions, expected 2",
            shape.len()
        ))
        .into());
    }
    let raw = ds.read_raw::<T>()?;
    Array2::from_shape_vec((shape[0], shape[1]), raw)
        .map_err(|e| camea_core::Error::ShapeMismatch(format!("dataset '{name}': {e}")).into())
}

fn read_3d<T: H5Type>(file: &File, path: &Path, name: &str) -> Result<Array3<T>> {
    let ds = dataset(file, path, name)?;
    let shape = ds.shape();
    if shape.len() != 3 {
        return Err(camea_core::Error::ShapeMismatch(format!(
            "dataset '{name}' has {} dimensions, expected 3",
            shape.len()
        ))
        .into());
    }
    let raw = ds.read_raw::<T>()?;
    Array3::from_shape_vec((shape[0], shape[1], shape[2]), raw)
        .map_err(|e| camea_core::Error::ShapeMismatch(format!("dataset '{name}': {e}")).into())
}

/// Reads a zero-offset dataset; a missing dataset means no offset.
fn read_offset(file: &File, name: &str) -> Result<f64> {
    match file.dataset(name) {
        Ok(ds) => Ok(ds.read_raw::<f64>()?.first().copied().unwrap_or(0.0)),
        Err(_) => Ok(0.0),
    }
}

fn read_str_opt(file: &File, name: &str) -> Result<Option<String>> {
    match file.dataset(name) {
        Ok(ds) => {
            let value: VarLenUnicode = ds.read_scalar()?;
            Ok(Some(value.to_string()))
        }
        Err(_) => Ok(None),
    }
}

fn read_sample(file: &File, path: &Path, map: &SchemaMap) -> Result<Sample> {
    let group = format!("{}/", map.sample_group);
    let name = read_str_opt(file, &format!("{group}name"))?.unwrap_or_else(|| "Unknown".into());
    let cell = dataset(file, path, &format!("{group}unit_cell"))?.read_raw::<f64>()?;
    if cell.len() != 6 {
        return Err(camea_core::Error::GeometryMismatch(format!(
            "unit cell has {} entries, expected 6",
            cell.len()
        ))
        .into());
    }
    let orientation = read_2d::<f64>(file, path, &format!("{group}orientation_matrix"))?;
    if orientation.dim() != (2, 3) {
        return Err(camea_core::Error::GeometryMismatch(format!(
            "orientation matrix has shape {:?}, expected (2, 3)",
            orientation.dim()
        ))
        .into());
    }
    let unit_cell = UnitCell::new(cell[0], cell[1], cell[2], cell[3], cell[4], cell[5])?;
    let rows = [
        [orientation[[0, 0]], orientation[[0, 1]], orientation[[0, 2]]],
        [orientation[[1, 0]], orientation[[1, 1]], orientation[[1, 2]]],
    ];
    Ok(Sample::new(name, unit_cell, rows)?)
}

fn read_calibration_slice(
    file: &File,
    path: &Path,
    map: &SchemaMap,
    binning: usize,
    detectors: usize,
) -> Result<CalibrationSlice> {
    let group = format!("{}/{binning}_pixels/", map.calibration_group);
    let ef_table = read_2d::<f64>(file, path, &format!("{group}ef"))?;
    let a4_flat = read_1d_f64(file, path, &format!("{group}a4"))?;
    let edge_table = read_2d::<f64>(file, path, &format!("{group}edges"))?;

    let total = ef_table.dim().0;
    if detectors == 0 || total % detectors != 0 {
        return Err(camea_core::Error::InvalidCalibration(format!(
            "{total} calibration rows for {detectors} detectors"
        ))
        .into());
    }
    let soft = total / detectors;
    if soft % binning != 0 {
        return Err(camea_core::Error::InvalidCalibration(format!(
            "{soft} software pixels per detector not divisible by binning {binning}"
        ))
        .into());
    }
    let shaped =
        |col: usize| Array2::from_shape_fn((detectors, soft), |(d, s)| ef_table[[d * soft + s, col]]);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let edge = |col: usize| {
        Array2::from_shape_fn((detectors, soft), |(d, s)| {
            edge_table[[d * soft + s, col]] as usize
        })
    };
    Ok(CalibrationSlice::new(
        binning,
        soft / binning,
        shaped(0),
        shaped(1),
        shaped(2),
        shaped(3),
        Array2::from_shape_fn((detectors, soft), |(d, s)| a4_flat[d * soft + s]),
        edge(0),
        edge(1),
    )?)
}

fn ensure_group(file: &File, path: &str) -> Result<Group> {
    let mut current = file.group("/")?;
    for part in path.split('/').filter(|p| !p.is_empty()) {
        current = match current.group(part) {
            Ok(group) => group,
            Err(_) => current.create_group(part)?,
        };
    }
    Ok(current)
}

fn write_1d<T: H5Type>(group: &Group, name: &str, data: ArrayView1<'_, T>) -> Result<()> {
    let ds = group.new_dataset::<T>().shape((data.len(),)).create(name)?;
    ds.write(data)?;
    Ok(())
}

fn write_2d<T: H5Type>(group: &Group, name: &str, data: ArrayView2<'_, T>) -> Result<()> {
    let ds = group.new_dataset::<T>().shape(data.dim()).create(name)?;
    ds.write(data)?;
    Ok(())
}

fn write_3d<T: H5Type>(group: &Group, name: &str, data: ArrayView3<'_, T>) -> Result<()> {
    let ds = group.new_dataset::<T>().shape(data.dim()).create(name)?;
    ds.write(data)?;
    Ok(())
}

fn write_1d_abs(file: &File, name: &str, data: ArrayView1<'_, f64>) -> Result<()> {
    let (parent, leaf) = split_parent(name);
    let group = ensure_group(file, parent)?;
    write_1d(&group, leaf, data)
}

fn write_1d_rel(group: &Group, name: &str, data: ArrayView1<'_, f64>) -> Result<()> {
    let (parent, leaf) = split_parent(name);
    let target = ensure_group_in(group, parent)?;
    write_1d(&target, leaf, data)
}

fn write_scalar_abs(file: &File, name: &str, value: f64) -> Result<()> {
    let (parent, leaf) = split_parent(name);
    let group = ensure_group(file, parent)?;
    group.new_dataset::<f64>().create(leaf)?.write_scalar(&value)?;
    Ok(())
}

fn ensure_group_in(group: &Group, path: &str) -> Result<Group> {
    let mut current = group.clone();
    for part in path.split('/').filter(|p| !p.is_empty()) {
        current = match current.group(part) {
            Ok(child) => child,
            Err(_) => current.create_group(part)?,
        };
    }
    Ok(current)
}

fn write_str_dataset(group: &Group, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    group
        .new_dataset::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn write_str_abs(file: &File, name: &str, value: &str) -> Result<()> {
    let (parent, leaf) = split_parent(name);
    let group = ensure_group(file, parent)?;
    write_str_dataset(&group, leaf, value)
}

fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    }
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value).map_err(|e| Error::InvalidString(format!("{e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;
    use tempfile::tempdir;

    fn slice() -> CalibrationSlice {
        CalibrationSlice::new(
            1,
            1,
            Array2::from_elem((1, 1), 10.0),
            Array2::from_elem((1, 1), 4.0),
            Array2::from_elem((1, 1), 0.5),
            Array2::zeros((1, 1)),
            Array2::from_elem((1, 1), -4.5),
            Array2::zeros((1, 1)),
            Array2::from_elem((1, 1), 2usize),
        )
        .unwrap()
    }

    fn meta() -> ScanMeta {
        let cell = UnitCell::new(6.0, 6.0, 12.0, 90.0, 90.0, 90.0).unwrap();
        let sample = Sample::new("crystal", cell, [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]).unwrap();
        ScanMeta {
            name: "scan.h5".into(),
            ei: arr1(&[5.0]),
            a3: arr1(&[0.0, 90.0]),
            a4: arr1(&[-30.0]),
            monitor: arr1(&[1000.0, 2000.0]),
            a3_offset: 0.0,
            a4_offset: 0.0,
            binning: 1,
            sample,
            scan_command: "sc a3".into(),
        }
    }

    fn converted() -> ConvertedData {
        let shape = (2, 1, 1);
        let fill = |v: f64| Array3::from_elem(shape, v);
        ConvertedData::new(
            fill(0.15),
            fill(0.0),
            fill(1.0),
            fill(5.0),
            fill(12.5),
            fill(1000.0),
            meta(),
        )
        .unwrap()
    }

    #[test]
    fn test_converted_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("converted.nxs");
        let map = SchemaMap::default();
        let data = converted();

        write_converted(&path, &map, &data, &slice(), &Provenance::default()).unwrap();
        let back = read_converted(&path, &map).unwrap();

        assert_eq!(back.dim(), data.dim());
        assert_eq!(back.intensity(), data.intensity());
        assert_eq!(back.meta().binning, 1);
        assert_eq!(back.meta().sample.name(), "crystal");
        assert_eq!(back.meta().a3, data.meta().a3);
        assert_eq!(back.meta().scan_command, "sc a3");
        // f32 storage round-trips these exact values.
        assert_eq!(back.qx()[[0, 0, 0]], f64::from(0.15_f32));
        assert_eq!(back.normalization()[[0, 0, 0]], 12.5);
    }

    #[test]
    fn test_converted_artifact_reloads_as_scan_calibration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("converted.nxs");
        let map = SchemaMap::default();

        write_converted(&path, &map, &converted(), &slice(), &Provenance::default()).unwrap();

        let file = File::open(&path).unwrap();
        let restored =
            read_calibration_slice(&file, &path, &map, 1, 1).unwrap();
        assert_eq!(restored, slice());
    }

    #[test]
    fn test_missing_dataset_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.nxs");
        File::create(&path).unwrap();
        let err = read_converted(&path, &SchemaMap::default()).unwrap_err();
        match err {
            Error::MissingDataset { dataset, .. } => {
                assert!(dataset.contains("entry/data"));
            }
            other => panic!("unexpected: {other}"),
        }
    }
}
