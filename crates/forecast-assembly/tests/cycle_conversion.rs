//! End-to-end conversion of synthetic GDPS and GFS cycle directories.

use std::path::Path;

use chrono::{NaiveTime, TimeZone, Utc};
use forecast_assembly::{
    group_cycles, AssemblyConfig, AssemblyError, CycleConverter, CycleFilter, Product,
    VariableKind,
};
use forecast_dataset::{read_dataset, DatasetError, OutputDataset};
use test_utils::{
    assert_approx_eq, CycleFixture, GDPS_DSWRF, GDPS_TCDC, GDPS_TMP, GDPS_WDIR, GDPS_WIND,
};

const CYCLE: &str = "2024010112";

fn leads(from: u32, to: u32) -> Vec<u32> {
    (from..=to).step_by(3).collect()
}

/// Every GDPS variable for one cycle, eight steps each.
fn write_gdps_cycle(fixture: &CycleFixture, cycle: &str) {
    fixture.write_gdps_series(&GDPS_DSWRF, "0", cycle, leads(0, 24));
    fixture.write_gdps_series(&GDPS_TCDC, "0", cycle, leads(0, 21));
    for level in ["500", "850"] {
        fixture.write_gdps_series(&GDPS_TMP, level, cycle, leads(0, 21));
    }
    for level in ["10", "40"] {
        fixture.write_gdps_series(&GDPS_WIND, level, cycle, leads(0, 21));
        fixture.write_gdps_series(&GDPS_WDIR, level, cycle, leads(0, 21));
    }
}

fn gdps_converter() -> CycleConverter {
    CycleConverter::new(AssemblyConfig::new(Product::Gdps)).unwrap()
}

fn run(converter: &CycleConverter, input: &Path, output: &Path) -> forecast_assembly::BatchReport {
    converter
        .run_batch(input, output, &CycleFilter::default(), 1)
        .unwrap()
}

fn hours(dataset: &OutputDataset, axis: &str) -> Vec<f64> {
    dataset.coordinate(axis).unwrap().values.to_f64_vec()
}

#[test]
fn test_full_gdps_cycle() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_gdps_cycle(&CycleFixture::new(input.path()), CYCLE);

    let report = run(&gdps_converter(), input.path(), output.path());
    assert!(report.is_success(), "{:?}", report.failed);
    assert_eq!(report.written.len(), 1);

    let written = &report.written[0];
    assert_eq!(written.path, output.path().join("CMC_20240101_12.zarr"));
    assert_eq!(
        written.variables,
        vec!["ghi", "cloud", "temperature", "wind_speed", "wind_direction"]
    );
    assert!(written.omitted.is_empty());

    let dataset = read_dataset(&written.path).unwrap();
    assert_eq!(dataset.product, "GDPS");
    assert_eq!(
        dataset.reference_time,
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    );
    assert_eq!(hours(&dataset, "forecastdate"), vec![19723.0]);
    assert_eq!(hours(&dataset, "forecasttime"), vec![720.0]);

    // 8 files from step 0 at a 3-hour cadence
    let cloud = dataset.variable("cloud").unwrap();
    assert_eq!(cloud.data.shape(), &[1, 1, 8, 3, 4]);
    assert_eq!(
        hours(&dataset, "step_cloud"),
        vec![0.0, 3.0, 6.0, 9.0, 12.0, 15.0, 18.0, 21.0]
    );

    // lead 0 dropped for irradiance
    assert_eq!(
        hours(&dataset, "step_ghi"),
        vec![3.0, 6.0, 9.0, 12.0, 15.0, 18.0, 21.0, 24.0]
    );
    let ghi = dataset.variable("ghi").unwrap();
    assert_approx_eq!(ghi.data[[0, 0, 0, 0, 0]], 3000.0, 0.01);

    // 2 levels x 8 files
    let temp = dataset.variable("temperature").unwrap();
    assert_eq!(temp.data.shape(), &[1, 1, 8, 2, 3, 4]);
    assert_eq!(
        temp.dims,
        vec!["forecastdate", "forecasttime", "step_temp", "air_pressure", "latitude", "longitude"]
    );
    assert_eq!(hours(&dataset, "air_pressure"), vec![500.0, 850.0]);
    assert_eq!(dataset.coordinate("air_pressure").unwrap().units, "hPa");
    for (step, lead) in [0.0f32, 3.0, 6.0, 9.0, 12.0, 15.0, 18.0, 21.0].iter().enumerate() {
        for (level, value) in [500.0f32, 850.0].iter().enumerate() {
            assert_approx_eq!(temp.data[[0, 0, step, level, 0, 0]], lead * 1000.0 + value, 0.01);
            assert_approx_eq!(
                temp.data[[0, 0, step, level, 2, 3]],
                lead * 1000.0 + value + 11.0,
                0.01
            );
        }
    }

    // both wind variables share the lead and level axes
    let speed = dataset.variable("wind_speed").unwrap();
    let direction = dataset.variable("wind_direction").unwrap();
    assert_eq!(speed.dims, direction.dims);
    assert_eq!(speed.dims[3], "ground_level");
    assert_eq!(hours(&dataset, "ground_level"), vec![10.0, 40.0]);
    assert_eq!(dataset.coordinate("ground_level").unwrap().units, "m");

    assert_eq!(hours(&dataset, "latitude"), vec![50.0, 49.0, 48.0]);
    assert_eq!(hours(&dataset, "longitude"), vec![250.0, 251.0, 252.0, 253.0]);
}

#[test]
fn test_inconsistent_level_files_omit_variable() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let fixture = CycleFixture::new(input.path());
    fixture.write_gdps_series(&GDPS_TCDC, "0", CYCLE, leads(0, 21));
    fixture.write_gdps_series(&GDPS_TMP, "850", CYCLE, leads(0, 21));
    fixture.write_gdps_series(&GDPS_TMP, "500", CYCLE, leads(0, 18));

    let converter = gdps_converter();
    let groups = group_cycles(Product::Gdps, input.path()).unwrap();
    let group = groups.values().next().unwrap();

    let err = converter
        .assemble_variable(group, VariableKind::Temperature)
        .unwrap_err();
    assert!(matches!(err, AssemblyError::InconsistentRecordCount { .. }));

    let report = run(&converter, input.path(), output.path());
    assert!(report.is_success());
    let written = &report.written[0];
    assert_eq!(written.variables, vec!["cloud"]);
    let omitted: Vec<_> = written.omitted.iter().map(|o| o.variable).collect();
    assert!(omitted.contains(&VariableKind::Temperature));
    assert!(written
        .omitted
        .iter()
        .any(|o| o.variable == VariableKind::Temperature && o.reason.contains("Inconsistent")));
}

#[test]
fn test_required_variable_failure_writes_nothing() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let fixture = CycleFixture::new(input.path());
    fixture.write_gdps_series(&GDPS_TCDC, "0", CYCLE, leads(0, 21));
    fixture.write_gdps_series(&GDPS_TMP, "850", CYCLE, leads(0, 21));
    fixture.write_gdps_series(&GDPS_TMP, "500", CYCLE, leads(0, 18));

    let mut config = AssemblyConfig::new(Product::Gdps);
    config.required = vec![VariableKind::Temperature];
    let converter = CycleConverter::new(config).unwrap();

    let report = run(&converter, input.path(), output.path());
    assert!(!report.is_success());
    assert!(report.written.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].error.contains("temperature"));
    assert!(!output.path().join("CMC_20240101_12.zarr").exists());
    assert_eq!(std::fs::read_dir(output.path()).unwrap().count(), 0);
}

#[test]
fn test_differing_grids_conflict_at_merge() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    CycleFixture::new(input.path()).write_gdps_series(&GDPS_TCDC, "0", CYCLE, leads(0, 21));
    CycleFixture::new(input.path())
        .with_grid(5, 3)
        .write_gdps_series(&GDPS_DSWRF, "0", CYCLE, leads(0, 24));

    let converter = gdps_converter();
    let groups = group_cycles(Product::Gdps, input.path()).unwrap();
    let err = converter
        .assemble_cycle(groups.values().next().unwrap())
        .unwrap_err();
    assert!(matches!(
        err,
        AssemblyError::Dataset(DatasetError::CoordinateConflict { .. })
    ));

    let report = run(&converter, input.path(), output.path());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(std::fs::read_dir(output.path()).unwrap().count(), 0);
}

/// Wind direction one step short of wind speed on the shared `step_wind` axis.
fn write_short_wind_direction(fixture: &CycleFixture) {
    fixture.write_gdps_series(&GDPS_TCDC, "0", CYCLE, leads(0, 21));
    fixture.write_gdps_series(&GDPS_WIND, "10", CYCLE, leads(0, 21));
    fixture.write_gdps_series(&GDPS_WDIR, "10", CYCLE, leads(0, 18));
}

#[test]
fn test_wind_step_conflict_omits_variable() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_short_wind_direction(&CycleFixture::new(input.path()));

    let report = run(&gdps_converter(), input.path(), output.path());
    assert!(report.is_success(), "{:?}", report.failed);

    let written = &report.written[0];
    assert_eq!(written.variables, vec!["cloud", "wind_speed"]);
    let direction = written
        .omitted
        .iter()
        .find(|o| o.variable == VariableKind::WindDirection)
        .unwrap();
    assert!(direction.reason.contains("step_wind"), "{}", direction.reason);

    let dataset = read_dataset(&written.path).unwrap();
    assert_eq!(dataset.variable_names(), vec!["cloud", "wind_speed"]);
    assert_eq!(hours(&dataset, "step_wind").len(), 8);
}

#[test]
fn test_wind_step_conflict_fails_when_required() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_short_wind_direction(&CycleFixture::new(input.path()));

    let mut config = AssemblyConfig::new(Product::Gdps);
    config.required = vec![VariableKind::WindDirection];
    let converter = CycleConverter::new(config).unwrap();

    let groups = group_cycles(Product::Gdps, input.path()).unwrap();
    let err = converter
        .assemble_cycle(groups.values().next().unwrap())
        .unwrap_err();
    match err {
        AssemblyError::RequiredVariableFailed { variable, source } => {
            assert_eq!(variable, "wind_direction");
            assert!(matches!(
                *source,
                AssemblyError::Dataset(DatasetError::CoordinateConflict { ref axis, .. }) if axis == "step_wind"
            ));
        }
        other => panic!("unexpected error {other:?}"),
    }

    let report = run(&converter, input.path(), output.path());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(std::fs::read_dir(output.path()).unwrap().count(), 0);
}

#[test]
fn test_missing_variable_is_omitted() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let fixture = CycleFixture::new(input.path());
    fixture.write_gdps_series(&GDPS_TCDC, "0", CYCLE, leads(0, 21));
    fixture.write_gdps_series(&GDPS_TMP, "850", CYCLE, leads(0, 21));
    std::fs::write(input.path().join("index.html"), b"<html></html>").unwrap();

    let report = run(&gdps_converter(), input.path(), output.path());
    assert!(report.is_success());

    let written = &report.written[0];
    assert_eq!(written.variables, vec!["cloud", "temperature"]);
    let omitted: Vec<_> = written.omitted.iter().map(|o| o.variable).collect();
    assert_eq!(
        omitted,
        vec![
            VariableKind::Ghi,
            VariableKind::WindSpeed,
            VariableKind::WindDirection
        ]
    );

    let dataset = read_dataset(&written.path).unwrap();
    assert_eq!(dataset.variable_names(), vec!["cloud", "temperature"]);
    assert_eq!(dataset.variable("temperature").unwrap().data.shape(), &[1, 1, 8, 1, 3, 4]);
}

#[test]
fn test_gfs_cycle_shares_lead_axis() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    CycleFixture::new(input.path()).write_gfs_series("20240101", "0600", leads(0, 12));

    let converter = CycleConverter::new(AssemblyConfig::new(Product::Gfs)).unwrap();
    let report = run(&converter, input.path(), output.path());
    assert!(report.is_success(), "{:?}", report.failed);

    let written = &report.written[0];
    assert_eq!(written.path, output.path().join("GFS_20240101_0600.zarr"));

    let dataset = read_dataset(&written.path).unwrap();
    assert_eq!(dataset.variable_names(), vec!["ghi", "temperature_2m"]);
    assert_eq!(hours(&dataset, "step"), vec![3.0, 6.0, 9.0, 12.0]);
    assert_eq!(hours(&dataset, "time"), vec![360.0]);

    let ghi = dataset.variable("ghi").unwrap();
    let t2m = dataset.variable("temperature_2m").unwrap();
    assert_eq!(ghi.dims, vec!["date", "time", "step", "latitude", "longitude"]);
    assert_eq!(ghi.dims, t2m.dims);
    assert_approx_eq!(ghi.data[[0, 0, 1, 0, 1]], 6001.0, 0.01);
    assert_approx_eq!(t2m.data[[0, 0, 1, 0, 1]], 6003.0, 0.01);
}

#[test]
fn test_batch_filters_and_parallel_jobs() {
    let input = tempfile::tempdir().unwrap();
    let fixture = CycleFixture::new(input.path());
    for cycle in ["2024010100", "2024010112", "2024010200"] {
        fixture.write_gdps_series(&GDPS_TCDC, "0", cycle, leads(0, 6));
    }
    let converter = gdps_converter();

    let noon = tempfile::tempdir().unwrap();
    let filter = CycleFilter {
        time_of_day: NaiveTime::from_hms_opt(12, 0, 0),
        ..Default::default()
    };
    let report = converter
        .run_batch(input.path(), noon.path(), &filter, 1)
        .unwrap();
    assert_eq!(report.written.len(), 1);
    assert_eq!(report.skipped, 2);
    assert!(noon.path().join("CMC_20240101_12.zarr").exists());

    let all = tempfile::tempdir().unwrap();
    let report = converter
        .run_batch(input.path(), all.path(), &CycleFilter::default(), 2)
        .unwrap();
    assert_eq!(report.written.len(), 3);
    let mut names: Vec<_> = report
        .written
        .iter()
        .map(|w| w.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec!["CMC_20240101_00.zarr", "CMC_20240101_12.zarr", "CMC_20240102_00.zarr"]
    );
}

#[test]
fn test_reprocessing_overwrites_output() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let fixture = CycleFixture::new(input.path());
    fixture.write_gdps_series(&GDPS_TCDC, "0", CYCLE, leads(0, 21));
    let converter = gdps_converter();

    run(&converter, input.path(), output.path());
    fixture.write_gdps_series(&GDPS_TMP, "850", CYCLE, leads(0, 21));
    let report = run(&converter, input.path(), output.path());

    let dataset = read_dataset(&report.written[0].path).unwrap();
    assert_eq!(dataset.variable_names(), vec!["cloud", "temperature"]);
    assert_eq!(std::fs::read_dir(output.path()).unwrap().count(), 1);
}
