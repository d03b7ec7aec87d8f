use notion_catalog_core::compile::PdfCompiler;
use notion_catalog_core::contract::DocumentCompiler;
use notion_catalog_core::render::PLACEHOLDER_IMAGE;
use notion_catalog_core::CatalogError;
use regex::bytes::Regex;
use std::fs;
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A valid 1x1 RGB PNG.
const PNG_1X1: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D,
    0x49, 0x48, 0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01,
    0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, 0xDE, 0x00, 0x00, 0x00,
    0x0C, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x38, 0xA0, 0xA5, 0x05,
    0x00, 0x02, 0xC2, 0x01, 0x15, 0xB7, 0x39, 0x7A, 0xD6, 0x00, 0x00, 0x00,
    0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

fn page_count(pdf: &[u8]) -> usize {
    Regex::new(r"/Type\s*/Page(?-u:\b)")
        .unwrap()
        .find_iter(pdf)
        .count()
}

fn embeds_image(pdf: &[u8]) -> bool {
    Regex::new(r"/Subtype\s*/Image").unwrap().is_match(pdf)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

fn page_with(products: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html><head><title>Catálogo</title><style>body {{ color: red; }}</style></head>
<body>
  <h1>Catálogo de Teste</h1>
  <p>Gerado em 01/01/2024 10:00 | 2 produtos</p>
  <hr>
  {products}
</body></html>"#
    )
}

fn card(name: &str, src: &str) -> String {
    format!(
        r#"<div class="product"><img src="{src}"><h2>{name}</h2><p class="price">R$ 1.234,50</p><p>SKU: X-1</p></div>"#
    )
}

#[test]
fn compiles_placeholder_and_unreachable_remote_images_to_pdf() {
    let compiler = PdfCompiler::new()
        .expect("compiler")
        .with_image_timeout(Duration::from_secs(2));
    let markup = page_with(&format!(
        "{}{}",
        card("Sem foto", PLACEHOLDER_IMAGE),
        card("Com foto", "http://127.0.0.1:9/foto.png")
    ));

    let bytes = compiler
        .compile(&markup, Path::new("."))
        .expect("compile should succeed");
    assert!(bytes.starts_with(b"%PDF"), "not a PDF header");
    assert_eq!(page_count(&bytes), 1);
    assert!(!embeds_image(&bytes), "unreachable image must be drawn as a frame");
}

#[test]
fn long_catalogs_span_multiple_pages() {
    let compiler = PdfCompiler::new().expect("compiler");
    let cards: String = (0..60)
        .map(|i| card(&format!("Produto {i}"), PLACEHOLDER_IMAGE))
        .collect();

    let single = compiler
        .compile(&page_with(&card("Um", PLACEHOLDER_IMAGE)), Path::new("."))
        .expect("compile should succeed");
    let many = compiler
        .compile(&page_with(&cards), Path::new("."))
        .expect("compile should succeed");

    assert_eq!(page_count(&single), 1);
    let pages = page_count(&many);
    assert!(pages >= 8, "60 cards fit on {pages} pages");
}

#[test]
fn card_taller_than_a_page_flows_onto_following_pages() {
    let compiler = PdfCompiler::new().expect("compiler");
    let lines: String = (0..200).map(|i| format!("<p>Linha {i}</p>")).collect();
    let markup = page_with(&format!(
        r#"<div class="product"><h2>Kit gigante</h2>{lines}</div>"#
    ));

    let bytes = compiler
        .compile(&markup, Path::new("."))
        .expect("compile should succeed");

    let pages = page_count(&bytes);
    assert!(pages >= 5, "200 lines fit on {pages} pages");
    // "Linha 199" survives the page breaks
    assert!(contains(&bytes, b"<4C696E686120313939>"));
}

#[test]
fn local_png_is_embedded() {
    let dir = tempfile::tempdir().expect("temp dir");
    fs::write(dir.path().join("logo.png"), PNG_1X1).unwrap();
    let compiler = PdfCompiler::new().expect("compiler");
    let markup = page_with(&format!(
        r#"<img src="logo.png">{}"#,
        card("Com logo", "logo.png")
    ));

    let bytes = compiler
        .compile(&markup, dir.path())
        .expect("compile should succeed");
    assert!(embeds_image(&bytes), "no image XObject in output");
}

#[test]
fn accented_text_is_written_as_win_ansi() {
    let compiler = PdfCompiler::new().expect("compiler");
    let markup = "<html><head><title>t</title></head><body><h1>Preço Ação</h1></body></html>";

    let bytes = compiler
        .compile(markup, Path::new("."))
        .expect("compile should succeed");

    // "Preço Ação" with ç = E7, ã = E3
    assert!(contains(&bytes, b"<507265E76F2041E7E36F>"));
    // footer "Página" with á = E1
    assert!(contains(&bytes, b"<50E167696E61"));
    assert!(!contains(&bytes, b"<507265C3A7"), "text written as UTF-8");
}

#[tokio::test]
async fn remote_image_is_downloaded_and_embedded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/foto.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(PNG_1X1),
        )
        .expect(1)
        .mount(&server)
        .await;
    let url = format!("{}/foto.png", server.uri());
    let compiler = PdfCompiler::new().expect("compiler");
    let markup = page_with(&format!("{}{}", card("A", &url), card("B", &url)));

    let bytes = compiler
        .compile(&markup, Path::new("."))
        .expect("compile should succeed");
    assert!(embeds_image(&bytes), "downloaded image not embedded");
}

#[tokio::test]
async fn failed_remote_download_is_drawn_as_a_frame() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sumiu.png"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    let compiler = PdfCompiler::new().expect("compiler");
    let markup = page_with(&card("Sem foto", &format!("{}/sumiu.png", server.uri())));

    let bytes = compiler
        .compile(&markup, Path::new("."))
        .expect("a missing remote image must not fail the catalog");
    assert!(bytes.starts_with(b"%PDF"));
    assert!(!embeds_image(&bytes));
}

#[test]
fn empty_markup_is_a_compilation_error() {
    let compiler = PdfCompiler::new().expect("compiler");
    let err = compiler.compile("   \n", Path::new(".")).unwrap_err();
    assert!(matches!(err, CatalogError::Compilation(_)), "got {err:?}");
}

#[test]
fn body_without_content_is_a_compilation_error() {
    let compiler = PdfCompiler::new().expect("compiler");
    let err = compiler
        .compile("<html><head><title>x</title></head><body>  </body></html>", Path::new("."))
        .unwrap_err();
    assert!(matches!(err, CatalogError::Compilation(_)), "got {err:?}");
}

#[test]
fn missing_local_image_is_a_compilation_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let compiler = PdfCompiler::new().expect("compiler");
    let markup = page_with(&card("Quebrado", "img/nao-existe.png"));

    match compiler.compile(&markup, dir.path()) {
        Err(CatalogError::Compilation(message)) => {
            assert!(message.contains("nao-existe.png"), "message: {message}");
        }
        other => panic!("expected compilation error, got {other:?}"),
    }
}

#[test]
fn undecodable_local_image_is_a_compilation_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    fs::write(dir.path().join("logo.png"), b"definitely not an image").unwrap();
    let compiler = PdfCompiler::new().expect("compiler");
    let markup = page_with(&card("Logo", "logo.png"));

    let err = compiler.compile(&markup, dir.path()).unwrap_err();
    assert!(matches!(err, CatalogError::Compilation(_)), "got {err:?}");
}

#[test]
fn unsupported_data_uri_is_a_compilation_error() {
    let compiler = PdfCompiler::new().expect("compiler");
    let markup = page_with(&card("Base64", "data:image/png;base64,AAAA"));

    let err = compiler.compile(&markup, Path::new(".")).unwrap_err();
    assert!(matches!(err, CatalogError::Compilation(_)), "got {err:?}");
}
