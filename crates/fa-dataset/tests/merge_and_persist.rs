//! Merging several imports along validity time and NetCDF persistence.

mod common;

use chrono::NaiveDateTime;
use common::{belgian_fixture, placeholder_fa_file, scratch_config, FixtureDecoder};
use fa_dataset::dataset::{attrs, dims};
use fa_dataset::{
    merge_by_validate, read_netcdf, save_netcdf, AttrValue, Collection, CoordValues, Dataset,
    FaError, FieldSelection, ImportOptions, Importer,
};
use test_utils::{fields, temp_test_dir, time};

fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

/// Import the Belgian fixture as if it were valid at `validate`.
fn import_at(validate: &str, origin: &str) -> Dataset {
    let data_dir = temp_test_dir();
    let scratch = temp_test_dir();
    let config = scratch_config(scratch.path());

    let mut fixture = belgian_fixture();
    fixture
        .validity(validate, time::BASEDATE)
        .meta("origin", serde_json::json!([origin]));
    let decoder = FixtureDecoder::new(fixture);
    let importer = Importer::new(&decoder, &config);

    let source = importer
        .open(placeholder_fa_file(data_dir.path(), origin))
        .unwrap();
    importer
        .import(
            &source,
            &FieldSelection::only([fields::CLS_TEMPERATURE, fields::WIND_U]),
            &ImportOptions::default(),
        )
        .unwrap()
}

#[test]
fn test_merge_three_lead_times() {
    let merged = merge_by_validate(vec![
        import_at(time::VALIDATE_16H, "ICMSHAR13+0016"),
        import_at(time::VALIDATE_14H, "ICMSHAR13+0014"),
        import_at(time::VALIDATE_15H, "ICMSHAR13+0015"),
    ])
    .unwrap();

    assert_eq!(
        merged.validate(),
        Some(vec![
            at(time::VALIDATE_14H),
            at(time::VALIDATE_15H),
            at(time::VALIDATE_16H)
        ])
    );
    assert_eq!(merged.basedate(), Some(vec![at(time::BASEDATE)]));
    assert_eq!(merged.leadtimes().len(), 3);

    let t2m = merged.var(fields::CLS_TEMPERATURE).unwrap();
    assert_eq!(t2m.dims, vec!["basedate", "validate", "y", "x"]);
    assert_eq!(t2m.data.shape(), &[1, 3, 5, 6]);
    let wind = merged.var(fields::WIND_U).unwrap();
    assert_eq!(wind.dims, vec!["basedate", "validate", "level", "y", "x"]);
    assert_eq!(wind.data[[0, 2, 1, 0, 0].as_slice()], 200_000.0);

    assert_eq!(
        merged.attr(attrs::ORIGINS),
        Some(&AttrValue::Strs(vec![
            "ICMSHAR13+0014".to_string(),
            "ICMSHAR13+0015".to_string(),
            "ICMSHAR13+0016".to_string()
        ]))
    );
    assert!(merged.attr(attrs::ORIGIN).is_none());
    assert_eq!(merged.attr(attrs::A_LIST), import_at(time::VALIDATE_14H, "x").attr(attrs::A_LIST));
}

#[test]
fn test_merge_rejects_other_vertical_grid() {
    let a = import_at(time::VALIDATE_14H, "ICMSHAR13+0014");
    let mut b = import_at(time::VALIDATE_15H, "ICMSHAR13+0015");
    b.set_attr(attrs::B_LIST, AttrValue::Floats(vec![0.0, 0.5, 1.0, 1.0]));

    assert!(matches!(
        merge_by_validate(vec![a, b]),
        Err(FaError::IncompatibleMerge(_))
    ));
}

#[test]
fn test_collection_needs_two_members() {
    let mut collection = Collection::default();
    collection.push(import_at(time::VALIDATE_14H, "ICMSHAR13+0014"));
    assert!(matches!(collection.merge(), Err(FaError::IncompatibleMerge(_))));

    collection.push(import_at(time::VALIDATE_15H, "ICMSHAR13+0015"));
    assert_eq!(collection.merge().unwrap().dim_len(dims::VALIDATE), Some(2));
    assert!(collection.merged().is_some());
}

#[test]
fn test_netcdf_roundtrip_single_file() {
    let out_dir = temp_test_dir();
    let ds = import_at(time::VALIDATE_14H, "ICMSHAR13+0014");

    let written = save_netcdf(&ds, out_dir.path().join("belgium"), false).unwrap();
    assert_eq!(written, out_dir.path().join("belgium.nc"));

    let back = read_netcdf(&written).unwrap();
    assert_eq!(back.fieldnames(), ds.fieldnames());
    assert_eq!(back.coords(), ds.coords());
    assert_eq!(back.attrs(), ds.attrs());
    for name in ds.fieldnames() {
        assert_eq!(back.var(&name), ds.var(&name), "field {}", name);
    }
    assert_eq!(back.coord(dims::LEVEL), Some(&CoordValues::Int(vec![1, 2, 3])));
    assert_eq!(back.validate(), Some(vec![at(time::VALIDATE_14H)]));
}

#[test]
fn test_netcdf_roundtrip_merged_keeps_missing_values() {
    let out_dir = temp_test_dir();
    let mut partial = import_at(time::VALIDATE_15H, "ICMSHAR13+0015");
    partial.remove_var(fields::CLS_TEMPERATURE);
    let merged =
        merge_by_validate(vec![import_at(time::VALIDATE_14H, "ICMSHAR13+0014"), partial]).unwrap();

    let written = save_netcdf(&merged, out_dir.path().join("merged.nc"), false).unwrap();
    let back = read_netcdf(&written).unwrap();

    let t2m = &back.var(fields::CLS_TEMPERATURE).unwrap().data;
    assert_eq!(t2m[[0, 0, 1, 2].as_slice()], 2001.0);
    assert!(t2m[[0, 1, 1, 2].as_slice()].is_nan());
    assert_eq!(back.validate(), merged.validate());
    assert_eq!(back.attr(attrs::ORIGINS), merged.attr(attrs::ORIGINS));
    assert_eq!(back.attr(attrs::A_LIST), merged.attr(attrs::A_LIST));
}

#[test]
fn test_netcdf_refuses_to_overwrite() {
    let out_dir = temp_test_dir();
    let ds = import_at(time::VALIDATE_14H, "ICMSHAR13+0014");
    let target = out_dir.path().join("out.nc");

    save_netcdf(&ds, &target, false).unwrap();
    assert!(matches!(
        save_netcdf(&ds, &target, false),
        Err(FaError::OutputExists(_))
    ));
    save_netcdf(&ds, &target, true).unwrap();
    // No partial files left next to the target
    assert_eq!(std::fs::read_dir(out_dir.path()).unwrap().count(), 1);
}
