use chrono::{Local, TimeZone};
use notion_catalog_core::config::OutputConfig;
use notion_catalog_core::output::{auto_filename_stem, with_pdf_extension, OutputManager};
use notion_catalog_core::CatalogError;
use std::fs;

const PDF: &[u8] = b"%PDF-1.7\n%fake\n";

fn manager_in(dir: &std::path::Path) -> OutputManager {
    let mut config = OutputConfig::new(dir.join("nested/output"));
    config.source_tag = "loja".into();
    OutputManager::new(config)
}

#[test]
fn pdf_extension_is_appended_exactly_once() {
    assert_eq!(with_pdf_extension("catalogo"), "catalogo.pdf");
    assert_eq!(with_pdf_extension("catalogo.pdf"), "catalogo.pdf");
    assert_eq!(with_pdf_extension("CATALOGO.PDF"), "CATALOGO.pdf");
    assert_eq!(with_pdf_extension("Promo.Pdf"), "Promo.pdf");
    assert_eq!(with_pdf_extension("pdf"), "pdf.pdf");
}

#[test]
fn uppercase_extension_is_listed_and_locatable() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = manager_in(dir.path());

    let artifact = output.persist(PDF, Some("Promo.PDF")).unwrap();

    assert_eq!(artifact.filename, "Promo.pdf");
    let listed = output.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].filename, "Promo.pdf");
    assert_eq!(output.locate(&artifact.filename).unwrap(), artifact.path);
}

#[test]
fn auto_name_uses_timestamp_and_tag() {
    let at = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
    assert_eq!(auto_filename_stem(at, "ja_distribuidora"), "catalogo_20240305_140709_ja_distribuidora");
}

#[test]
fn explicit_name_is_sanitized_and_directory_created() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = manager_in(dir.path());

    let artifact = output
        .persist(PDF, Some("Promoção: março/abril"))
        .expect("persist should succeed");

    assert_eq!(artifact.filename, "Promoção_ março_abril.pdf");
    assert_eq!(artifact.path, dir.path().join("nested/output/Promoção_ março_abril.pdf"));
    assert_eq!(artifact.size_bytes, PDF.len() as u64);
    assert_eq!(fs::read(&artifact.path).unwrap(), PDF);
}

#[test]
fn explicit_name_overwrites_previous_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = manager_in(dir.path());

    output.persist(b"%PDF-old", Some("fixo.pdf")).unwrap();
    let artifact = output.persist(PDF, Some("fixo.pdf")).unwrap();

    assert_eq!(fs::read(&artifact.path).unwrap(), PDF);
    assert_eq!(output.list().unwrap().len(), 1);
}

#[test]
fn name_that_sanitizes_to_nothing_is_rejected() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = manager_in(dir.path());

    let err = output.persist(PDF, Some(" ... ")).unwrap_err();
    assert!(matches!(err, CatalogError::InvalidFilename(_)), "got {err:?}");
}

#[test]
fn same_second_auto_names_never_collide() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = manager_in(dir.path());
    let at = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();

    let first = output.persist_at(PDF, None, at).unwrap();
    let second = output.persist_at(PDF, None, at).unwrap();
    let third = output.persist_at(PDF, None, at).unwrap();

    assert_eq!(first.filename, "catalogo_20240305_140709_loja.pdf");
    assert_eq!(second.filename, "catalogo_20240305_140709_loja_2.pdf");
    assert_eq!(third.filename, "catalogo_20240305_140709_loja_3.pdf");
    for artifact in [&first, &second, &third] {
        assert!(artifact.path.is_file());
        assert!(artifact.size_bytes > 0);
    }
}

#[test]
fn temp_files_do_not_linger_in_output_dir() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = manager_in(dir.path());
    output.persist(PDF, None).unwrap();
    output.persist(PDF, Some("b")).unwrap();

    let entries: Vec<_> = fs::read_dir(output.output_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(entries.len(), 2, "unexpected entries: {entries:?}");
    assert!(entries.iter().all(|name| name.ends_with(".pdf")));
}

#[test]
fn locate_validates_names_and_reports_missing_files() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = manager_in(dir.path());
    let artifact = output.persist(PDF, Some("existe")).unwrap();

    assert_eq!(output.locate("existe.pdf").unwrap(), artifact.path);
    assert!(matches!(
        output.locate("../segredo.pdf"),
        Err(CatalogError::InvalidFilename(_))
    ));
    assert!(matches!(
        output.locate("sub/dir.pdf"),
        Err(CatalogError::InvalidFilename(_))
    ));
    assert!(matches!(
        output.locate("notas.txt"),
        Err(CatalogError::InvalidFilename(_))
    ));
    assert!(matches!(
        output.locate("sumiu.pdf"),
        Err(CatalogError::NotFound(_))
    ));
}

#[test]
fn list_is_empty_before_first_generation_and_skips_other_files() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = manager_in(dir.path());
    assert!(output.list().unwrap().is_empty());

    output.persist(PDF, Some("a")).unwrap();
    fs::write(output.output_dir().join("leia-me.txt"), "x").unwrap();

    let listed = output.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].filename, "a.pdf");
}
