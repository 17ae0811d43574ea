// End-to-end scenarios against the public API, driven over a real file
// standing in for the raw block device (spec.md section 8 "Scenarios").

use bootinfo::{BootInfoContext, BootInfoError, Config, OpenFlags};
use std::io::{Seek, SeekFrom, Write};

fn make_config(dir: &tempfile::TempDir, device_path: &std::path::Path) -> Config {
    let mut cfg = Config::new_with_base(0);
    cfg.ext_sectors = 1; // two 1 KiB slots, small enough for fast tests
    cfg.slot_b_offset = cfg.slot_size();
    cfg.candidate_paths = vec![device_path.to_str().unwrap().to_string()];
    cfg.lock_dir = dir.path().join("lock").to_str().unwrap().to_string();
    cfg
}

fn make_device(dir: &tempfile::TempDir, cfg_ext_sectors_bytes: u64) -> std::path::PathBuf {
    let path = dir.path().join("device.img");
    let f = std::fs::File::create(&path).unwrap();
    f.set_len(cfg_ext_sectors_bytes).unwrap();
    path
}

fn device_size_for(ext_sectors: u16) -> u64 {
    2 * (1 + ext_sectors as u64) * 512
}

#[test]
fn scenario_fresh_device_force_init_then_set() {
    let dir = tempfile::tempdir().unwrap();
    let device_path = make_device(&dir, device_size_for(1));
    let cfg = make_config(&dir, &device_path);

    let mut ctx = BootInfoContext::open(cfg.clone(), OpenFlags::FORCE_INIT).unwrap();
    ctx.set("foo", Some("bar")).unwrap();
    ctx.update().unwrap();
    ctx.close().unwrap();

    let ctx = BootInfoContext::open(cfg, OpenFlags::READ_ONLY).unwrap();
    assert_eq!(ctx.get("foo").unwrap(), "bar");
    assert!(!ctx.is_in_progress());
    assert_eq!(ctx.failed_boot_count(), 0);
}

#[test]
fn scenario_mark_in_progress_twice_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let device_path = make_device(&dir, device_size_for(1));
    let cfg = make_config(&dir, &device_path);

    let mut ctx = BootInfoContext::open(cfg.clone(), OpenFlags::FORCE_INIT).unwrap();
    ctx.mark_in_progress().unwrap();
    ctx.close().unwrap();

    let mut ctx = BootInfoContext::open(cfg.clone(), OpenFlags::empty()).unwrap();
    ctx.mark_in_progress().unwrap();
    ctx.close().unwrap();

    let ctx = BootInfoContext::open(cfg, OpenFlags::READ_ONLY).unwrap();
    assert_eq!(ctx.failed_boot_count(), 1);
    assert!(ctx.is_in_progress());
}

#[test]
fn scenario_reinit_preserves_only_underscore_prefixed() {
    let dir = tempfile::tempdir().unwrap();
    let device_path = make_device(&dir, device_size_for(1));
    let cfg = make_config(&dir, &device_path);

    let mut ctx = BootInfoContext::open(cfg.clone(), OpenFlags::FORCE_INIT).unwrap();
    ctx.set("_keep", Some("1")).unwrap();
    ctx.set("drop", Some("2")).unwrap();
    ctx.update().unwrap();
    ctx.close().unwrap();

    let ctx = BootInfoContext::open(cfg.clone(), OpenFlags::FORCE_INIT).unwrap();
    ctx.close().unwrap();

    let ctx = BootInfoContext::open(cfg, OpenFlags::READ_ONLY).unwrap();
    assert_eq!(ctx.get("_keep").unwrap(), "1");
    assert!(matches!(ctx.get("drop"), Err(BootInfoError::NotFound)));
}

#[test]
fn scenario_destination_slot_corruption_recovers_and_advances() {
    let dir = tempfile::tempdir().unwrap();
    let device_path = make_device(&dir, device_size_for(1));
    let cfg = make_config(&dir, &device_path);

    let mut ctx = BootInfoContext::open(cfg.clone(), OpenFlags::FORCE_INIT).unwrap();
    ctx.set("a", Some("1")).unwrap();
    ctx.update().unwrap();
    ctx.close().unwrap();

    // Zero the destination slot's header sector externally (the slot that
    // will be written on the *next* update, i.e. the currently non-current
    // one -- zeroing it must not disturb what a read-only open observes).
    {
        let mut f = std::fs::OpenOptions::new().write(true).open(&device_path).unwrap();
        f.seek(SeekFrom::Start(cfg.slot_b_offset)).unwrap();
        f.write_all(&vec![0u8; 512]).unwrap();
    }

    let ctx = BootInfoContext::open(cfg.clone(), OpenFlags::READ_ONLY).unwrap();
    assert_eq!(ctx.get("a").unwrap(), "1");
    drop(ctx);

    let mut ctx = BootInfoContext::open(cfg.clone(), OpenFlags::empty()).unwrap();
    ctx.set("x", Some("y")).unwrap();
    ctx.update().unwrap();
    ctx.close().unwrap();

    let ctx = BootInfoContext::open(cfg, OpenFlags::READ_ONLY).unwrap();
    assert_eq!(ctx.get("x").unwrap(), "y");
    assert_eq!(ctx.get("a").unwrap(), "1");
}

#[test]
fn scenario_max_length_value_accepted_one_byte_over_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let device_path = make_device(&dir, device_size_for(1));
    let cfg = make_config(&dir, &device_path);

    let capacity = bootinfo::slot::variable_area_capacity(&cfg);
    // overhead for one entry named "v": "v" + null + null = 3 bytes, plus
    // the table's own trailing null already counted in serialized_len().
    let max_value_len = capacity - ("v".len() + 1 + 1 + 1);

    let mut ctx = BootInfoContext::open(cfg.clone(), OpenFlags::FORCE_INIT).unwrap();
    let value = "x".repeat(max_value_len);
    ctx.set("v", Some(&value)).unwrap();
    ctx.update().unwrap();
    ctx.close().unwrap();

    let ctx = BootInfoContext::open(cfg.clone(), OpenFlags::READ_ONLY).unwrap();
    assert_eq!(ctx.get("v").unwrap().len(), max_value_len);
    drop(ctx);

    let mut ctx = BootInfoContext::open(cfg, OpenFlags::empty()).unwrap();
    let too_long = "x".repeat(max_value_len + 1);
    assert!(matches!(
        ctx.set("v", Some(&too_long)),
        Err(BootInfoError::Oversize)
    ));
}

#[test]
fn scenario_invalid_name_missing_var_and_read_only_rejections() {
    let dir = tempfile::tempdir().unwrap();
    let device_path = make_device(&dir, device_size_for(1));
    let cfg = make_config(&dir, &device_path);

    let mut ctx = BootInfoContext::open(cfg.clone(), OpenFlags::FORCE_INIT).unwrap();
    assert!(matches!(
        ctx.set("1foo", Some("bar")),
        Err(BootInfoError::InvalidArgument)
    ));
    assert!(matches!(
        ctx.set("foo", Some("")),
        Err(BootInfoError::NotFound)
    ));
    ctx.close().unwrap();

    let mut ro_ctx = BootInfoContext::open(cfg, OpenFlags::READ_ONLY).unwrap();
    assert!(matches!(
        ro_ctx.set("foo", Some("ok")),
        Err(BootInfoError::ReadOnly)
    ));
}

#[test]
fn open_rejects_read_only_and_force_init_together() {
    let dir = tempfile::tempdir().unwrap();
    let device_path = make_device(&dir, device_size_for(1));
    let cfg = make_config(&dir, &device_path);

    let flags = OpenFlags::READ_ONLY | OpenFlags::FORCE_INIT;
    assert!(matches!(
        BootInfoContext::open(cfg, flags),
        Err(BootInfoError::InvalidArgument)
    ));
}

#[test]
fn open_rejects_out_of_range_ext_sectors() {
    let dir = tempfile::tempdir().unwrap();
    let device_path = make_device(&dir, device_size_for(1));
    let mut cfg = make_config(&dir, &device_path);
    cfg.ext_sectors = 0;

    assert!(matches!(
        BootInfoContext::open(cfg, OpenFlags::FORCE_INIT),
        Err(BootInfoError::InvalidArgument)
    ));
}

#[test]
fn read_only_open_on_uninitialized_device_reports_no_valid_store() {
    let dir = tempfile::tempdir().unwrap();
    let device_path = make_device(&dir, device_size_for(1));
    let cfg = make_config(&dir, &device_path);

    assert!(matches!(
        BootInfoContext::open(cfg, OpenFlags::READ_ONLY),
        Err(BootInfoError::NoValidStore)
    ));
}
