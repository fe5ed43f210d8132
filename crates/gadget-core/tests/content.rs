use gadget_core::{validate_content, ErrorKind};
use gadget_schema::{Content, Filesystem, Info, PartitionType, Schema, Volume, VolumeStructure, MIB};
use std::fs;
use std::path::Path;

const BIOS_BOOT: &str = "DA,21686148-6449-6E6F-744E-656564454649";

fn bare(name: &str, image: &str) -> VolumeStructure {
    let ptype: PartitionType = BIOS_BOOT.parse().unwrap();
    VolumeStructure::new(name, ptype, MIB).with_content(Content::raw(image))
}

fn write_sized(path: &Path, size: usize) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, vec![0_u8; size]).unwrap();
}

#[test]
fn missing_raw_content_is_a_layout_failure() {
    let dir = tempfile::tempdir().unwrap();
    let info = Info::new([Volume::new("pc", Schema::Gpt)
        .with_bootloader("grub")
        .with_structure(bare("foo", "foo.img").with_offset(MIB))]);

    let err = validate_content(&info, dir.path()).unwrap_err();
    let expected = format!(
        r#"invalid layout of volume "pc": cannot lay out structure #0 ("foo"): content "foo.img": stat {}: no such file or directory"#,
        dir.path().join("foo.img").display()
    );
    assert_eq!(err.to_string(), expected);
    assert_eq!(err.kind(), ErrorKind::ContentPrecondition);

    write_sized(&dir.path().join("foo.img"), 1);
    assert!(validate_content(&info, dir.path()).is_ok());
}

#[test]
fn multi_volume_content_is_checked_per_volume() {
    let dir = tempfile::tempdir().unwrap();
    let info = Info::new([
        Volume::new("first", Schema::Gpt)
            .with_bootloader("grub")
            .with_structure(bare("first-foo", "first.img")),
        Volume::new("second", Schema::Gpt).with_structure(bare("second-foo", "second.img")),
    ]);
    write_sized(&dir.path().join("first.img"), 1);

    let err = validate_content(&info, dir.path()).unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.starts_with(
            r#"invalid layout of volume "second": cannot lay out structure #0 ("second-foo"): content "second.img": stat "#
        ),
        "{msg}"
    );
    assert!(msg.ends_with("/second.img: no such file or directory"), "{msg}");
}

#[test]
fn filesystem_content_trailing_slash_semantics() {
    let dir = tempfile::tempdir().unwrap();
    let ptype: PartitionType = BIOS_BOOT.parse().unwrap();
    let info = Info::new([Volume::new("bad", Schema::Gpt)
        .with_bootloader("grub")
        .with_structure(
            VolumeStructure::new("bad-struct", ptype, MIB)
                .with_filesystem(Filesystem::Ext4)
                .with_content(Content::filesystem("foo/", "/")),
        )]);

    let err = validate_content(&info, dir.path()).unwrap_err();
    assert_eq!(
        err.to_string(),
        r#"invalid volume "bad": structure #0 ("bad-struct"), content source:foo/: source path does not exist"#
    );

    // a file conflicts with foo/ as the source
    let foo = dir.path().join("foo");
    write_sized(&foo, 1);
    let err = validate_content(&info, dir.path()).unwrap_err();
    assert_eq!(
        err.to_string(),
        r#"invalid volume "bad": structure #0 ("bad-struct"), content source:foo/: cannot specify trailing / for a source which is not a directory"#
    );
    assert_eq!(err.kind(), ErrorKind::ContentPrecondition);

    fs::remove_file(&foo).unwrap();
    fs::create_dir(&foo).unwrap();
    assert!(validate_content(&info, dir.path()).is_ok());
}

#[test]
fn target_paths_are_not_checked() {
    let dir = tempfile::tempdir().unwrap();
    write_sized(&dir.path().join("grub.cfg"), 16);
    let ptype: PartitionType = BIOS_BOOT.parse().unwrap();
    let info = Info::new([Volume::new("pc", Schema::Gpt).with_structure(
        VolumeStructure::new("EFI System", ptype, MIB)
            .with_filesystem(Filesystem::Vfat)
            .with_content(Content::filesystem("grub.cfg", "EFI/ubuntu/does-not-exist.cfg")),
    )]);
    assert!(validate_content(&info, dir.path()).is_ok());
}

#[test]
fn oversized_image_does_not_fit() {
    let dir = tempfile::tempdir().unwrap();
    let ptype: PartitionType = BIOS_BOOT.parse().unwrap();
    let info = Info::new([Volume::new("pc", Schema::Gpt).with_structure(
        VolumeStructure::new("tiny", ptype, 512).with_content(Content::raw("big.img")),
    )]);
    write_sized(&dir.path().join("big.img"), 513);

    let err = validate_content(&info, dir.path()).unwrap_err();
    assert_eq!(
        err.to_string(),
        r#"invalid layout of volume "pc": cannot lay out structure #0 ("tiny"): content "big.img" does not fit in the structure"#
    );
}

#[test]
fn geometry_failures_surface_before_content() {
    let dir = tempfile::tempdir().unwrap();
    let info = Info::new([Volume::new("pc", Schema::Gpt)
        .with_structure(bare("one", "one.img").with_offset(MIB))
        .with_structure(bare("two", "two.img").with_offset(MIB))]);

    let err = validate_content(&info, dir.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LayoutInfeasible);
    assert!(err
        .to_string()
        .ends_with(r#"cannot lay out structure #1 ("two"): overlaps with previous structure #0 ("one")"#));
}

#[test]
fn content_validation_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let info = Info::new([Volume::new("pc", Schema::Gpt).with_structure(bare("foo", "foo.img"))]);

    let first = validate_content(&info, dir.path()).unwrap_err().to_string();
    let second = validate_content(&info, dir.path()).unwrap_err().to_string();
    assert_eq!(first, second);

    write_sized(&dir.path().join("foo.img"), 8);
    assert!(validate_content(&info, dir.path()).is_ok());
    assert!(validate_content(&info, dir.path()).is_ok());
}

#[test]
fn content_kind_must_match_structure() {
    let dir = tempfile::tempdir().unwrap();
    let ptype: PartitionType = BIOS_BOOT.parse().unwrap();

    let bare_with_source = Info::new([Volume::new("pc", Schema::Gpt).with_structure(
        VolumeStructure::new("foo", ptype.clone(), MIB)
            .with_content(Content::filesystem("does-not-exist", "/")),
    )]);
    let err = validate_content(&bare_with_source, dir.path()).unwrap_err();
    assert_eq!(
        err.to_string(),
        r#"invalid volume "pc": invalid structure #0 ("foo"): invalid content #0: cannot use non-image content for bare file system"#
    );
    assert_eq!(err.kind(), ErrorKind::Structural);

    let fs_with_image = Info::new([Volume::new("pc", Schema::Gpt).with_structure(
        VolumeStructure::new("foo", ptype, MIB)
            .with_filesystem(Filesystem::Ext4)
            .with_content(Content::raw("missing.img")),
    )]);
    let err = validate_content(&fs_with_image, dir.path()).unwrap_err();
    assert_eq!(
        err.to_string(),
        r#"invalid volume "pc": invalid structure #0 ("foo"): invalid content #0: cannot use image content for non-bare file system"#
    );
}

#[test]
fn image_must_be_a_regular_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("x.img")).unwrap();
    let info = Info::new([Volume::new("pc", Schema::Gpt).with_structure(bare("foo", "x.img"))]);

    let err = validate_content(&info, dir.path()).unwrap_err();
    assert_eq!(
        err.to_string(),
        r#"invalid layout of volume "pc": cannot lay out structure #0 ("foo"): content "x.img" is not a regular file"#
    );
    assert_eq!(err.kind(), ErrorKind::ContentPrecondition);
}

#[test]
fn empty_target_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_sized(&dir.path().join("grub.cfg"), 16);
    let ptype: PartitionType = BIOS_BOOT.parse().unwrap();
    let info = Info::new([Volume::new("pc", Schema::Gpt).with_structure(
        VolumeStructure::new("EFI System", ptype, MIB)
            .with_filesystem(Filesystem::Vfat)
            .with_content(Content::filesystem("grub.cfg", "")),
    )]);

    let err = validate_content(&info, dir.path()).unwrap_err();
    assert_eq!(
        err.to_string(),
        r#"invalid volume "pc": invalid structure #0 ("EFI System"): invalid content #0: missing source or target"#
    );
    assert!(gadget_core::validate(&info, None, None).is_err());
}
