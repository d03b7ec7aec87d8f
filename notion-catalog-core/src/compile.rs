//! HTML -> PDF compilation with printpdf.
//!
//! The rendered markup is parsed with `scraper` into a flat list of blocks
//! (text runs, images, rules and product cards) which are then laid out top
//! to bottom on A4 pages using the built-in Helvetica faces. Layout is plain
//! block flow with greedy word wrap. A product card stays on one page when it
//! fits on one; a taller card flows on line by line without its frame.
//!
//! Text is written in WinAnsi (Windows-1252), the encoding the built-in faces
//! are declared with, so accented Portuguese comes out as single glyphs.
//!
//! Image sources:
//! - `data:image/svg+xml,...` is drawn as a filled box with the SVG's caption
//!   (this is how the render-time placeholder comes out).
//! - `http(s)://` is downloaded and embedded. When the download or decode
//!   fails the image becomes a framed box labelled with the host.
//! - anything else is a local path (optionally `file://`) resolved against
//!   the base directory and embedded; it must exist and decode.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use printpdf::{
    BuiltinFont, Color, DictItem, Line, LinePoint, Mm, Op, PaintMode, PdfDocument, PdfPage,
    PdfSaveOptions, Point, Polygon, PolygonRing, Pt, RawImage, Rgb, WindingOrder,
    XObjectTransform,
};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, error, info, warn};

use crate::contract::DocumentCompiler;
use crate::error::CatalogError;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 15.0;
const FOOTER_HEIGHT: f32 = 10.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const IMAGE_SIZE: f32 = 30.0;
const CARD_PADDING: f32 = 4.0;
const CARD_GAP: f32 = 5.0;
const BLOCK_SPACING: f32 = 2.0;
const PT_TO_MM: f32 = 0.352_778;
/// printpdf places raster images at this resolution unless told otherwise.
const IMAGE_DPI: f32 = 300.0;
const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq)]
struct TextStyle {
    size: f32,
    bold: bool,
}

impl TextStyle {
    const BODY: TextStyle = TextStyle {
        size: 10.0,
        bold: false,
    };
    const BODY_BOLD: TextStyle = TextStyle {
        size: 10.0,
        bold: true,
    };

    fn heading(level: u8) -> Self {
        let size = match level {
            1 => 20.0,
            2 => 14.0,
            _ => 12.0,
        };
        TextStyle { size, bold: true }
    }

    fn font(&self) -> BuiltinFont {
        if self.bold {
            BuiltinFont::HelveticaBold
        } else {
            BuiltinFont::Helvetica
        }
    }

    fn line_height(&self) -> f32 {
        self.size * 1.3 * PT_TO_MM
    }

    fn ascent(&self) -> f32 {
        self.size * PT_TO_MM
    }

    /// Approximate: average Helvetica glyph is about half an em wide.
    fn chars_per_line(&self, width: f32) -> usize {
        let factor = if self.bold { 0.56 } else { 0.5 };
        let glyph = self.size * factor * PT_TO_MM;
        ((width / glyph) as usize).max(1)
    }
}

enum ImageSource {
    Placeholder { label: String, fill: Color },
    /// Drawn as a framed box until downloaded.
    Remote { url: String, label: String },
    Raster(RawImage),
}

enum Block {
    Text { text: String, style: TextStyle },
    Image(ImageSource),
    Rule,
    /// Images on the left, text on the right, kept on one page when it fits.
    Card(Vec<Block>),
}

/// Reads the caption and background out of an inline SVG placeholder.
struct SvgPlaceholder {
    label: Regex,
    fill: Regex,
}

impl SvgPlaceholder {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            label: Regex::new(r"<text[^>]*>([^<]*)</text>")?,
            fill: Regex::new(r#"<rect[^>]*fill=['"]#([0-9a-fA-F]{6})['"]"#)?,
        })
    }

    fn parse(&self, svg: &str) -> ImageSource {
        let label = self
            .label
            .captures(svg)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        let fill = self
            .fill
            .captures(svg)
            .and_then(|c| c.get(1))
            .and_then(|m| hex_color(m.as_str()))
            .unwrap_or_else(|| rgb(0.94, 0.94, 0.94));
        ImageSource::Placeholder { label, fill }
    }
}

/// Compiles catalog markup into an A4 PDF.
pub struct PdfCompiler {
    svg: SvgPlaceholder,
    image_timeout: Duration,
}

impl PdfCompiler {
    pub fn new() -> Result<Self, CatalogError> {
        let svg = SvgPlaceholder::new()
            .map_err(|e| CatalogError::Compilation(format!("invalid built-in pattern: {e}")))?;
        Ok(Self {
            svg,
            image_timeout: DEFAULT_IMAGE_TIMEOUT,
        })
    }

    /// Per-request timeout for downloading remote images.
    pub fn with_image_timeout(mut self, timeout: Duration) -> Self {
        self.image_timeout = timeout;
        self
    }
}

impl DocumentCompiler for PdfCompiler {
    fn compile(&self, markup: &str, base_dir: &Path) -> Result<Vec<u8>, CatalogError> {
        if markup.trim().is_empty() {
            error!("Refusing to compile empty markup");
            return Err(CatalogError::Compilation("markup is empty".to_string()));
        }

        let html = Html::parse_document(markup);
        if !html.errors.is_empty() {
            debug!(count = html.errors.len(), "Markup parsed with recoverable errors");
        }

        let title = select_text(&html, "title")?.unwrap_or_else(|| "Catálogo".to_string());
        let body_selector = selector("body")?;
        let body = html.select(&body_selector).next().ok_or_else(|| {
            CatalogError::Compilation("markup has no <body> element".to_string())
        })?;

        let mut walker = Walker::new(base_dir, &self.svg);
        walker.walk(body)?;
        walker.flush();
        if walker.blocks.is_empty() {
            error!("Markup body has no renderable content");
            return Err(CatalogError::Compilation(
                "markup body has no renderable content".to_string(),
            ));
        }
        embed_remote_images(&mut walker.blocks, self.image_timeout);

        let mut doc = PdfDocument::new(&title);
        let pages = {
            let mut layout = Layout::new(&mut doc);
            for block in &walker.blocks {
                layout.place(block);
            }
            layout.finish()
        };

        let total = pages.len();
        let pdf_pages: Vec<PdfPage> = pages
            .into_iter()
            .enumerate()
            .map(|(index, mut ops)| {
                footer(&mut ops, index + 1, total);
                PdfPage::new(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), ops)
            })
            .collect();

        // Text goes out as raw `Tj` operators, which printpdf only writes
        // when not in secure mode.
        let options = PdfSaveOptions {
            secure: false,
            ..Default::default()
        };
        let mut warnings = Vec::new();
        let bytes = doc.with_pages(pdf_pages).save(&options, &mut warnings);
        if !warnings.is_empty() {
            debug!(count = warnings.len(), "PDF serialisation produced warnings");
        }

        info!(
            pages = total,
            blocks = walker.blocks.len(),
            bytes = bytes.len(),
            "Compiled catalog document"
        );
        Ok(bytes)
    }
}

fn selector(css: &str) -> Result<Selector, CatalogError> {
    Selector::parse(css)
        .map_err(|e| CatalogError::Compilation(format!("invalid selector '{css}': {e:?}")))
}

fn select_text(html: &Html, css: &str) -> Result<Option<String>, CatalogError> {
    let selector = selector(css)?;
    Ok(html
        .select(&selector)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|text| !text.is_empty()))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn has_class(element: &ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "p" | "div"
            | "section"
            | "article"
            | "header"
            | "footer"
            | "main"
            | "ul"
            | "ol"
            | "li"
            | "table"
            | "thead"
            | "tbody"
            | "tr"
            | "td"
            | "th"
            | "figure"
            | "figcaption"
            | "blockquote"
            | "dl"
            | "dt"
            | "dd"
    )
}

/// Walks the DOM collecting layout blocks; inline text accumulates in
/// `pending` until a block boundary flushes it.
struct Walker<'a> {
    base_dir: &'a Path,
    svg: &'a SvgPlaceholder,
    blocks: Vec<Block>,
    pending: String,
    bold: usize,
}

impl<'a> Walker<'a> {
    fn new(base_dir: &'a Path, svg: &'a SvgPlaceholder) -> Self {
        Self {
            base_dir,
            svg,
            blocks: Vec::new(),
            pending: String::new(),
            bold: 0,
        }
    }

    fn walk(&mut self, element: ElementRef<'_>) -> Result<(), CatalogError> {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.pending.push_str(text),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.element(child)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn element(&mut self, element: ElementRef<'_>) -> Result<(), CatalogError> {
        let name = element.value().name();
        match name {
            "head" | "script" | "style" | "template" | "noscript" => Ok(()),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush();
                let level = name[1..].parse::<u8>().unwrap_or(6);
                let text = collapse_whitespace(&element.text().collect::<String>());
                if !text.is_empty() {
                    self.blocks.push(Block::Text {
                        text,
                        style: TextStyle::heading(level),
                    });
                }
                Ok(())
            }
            "img" => {
                self.flush();
                match element.value().attr("src").map(str::trim) {
                    Some(src) if !src.is_empty() => {
                        let image = self.resolve_image(src)?;
                        self.blocks.push(Block::Image(image));
                    }
                    _ => debug!("Skipping <img> without src"),
                }
                Ok(())
            }
            "hr" => {
                self.flush();
                self.blocks.push(Block::Rule);
                Ok(())
            }
            "br" => {
                self.flush();
                Ok(())
            }
            _ if has_class(&element, "product") => {
                self.flush();
                let mut card = Walker::new(self.base_dir, self.svg);
                card.bold = self.bold;
                card.walk(element)?;
                card.flush();
                if !card.blocks.is_empty() {
                    self.blocks.push(Block::Card(card.blocks));
                }
                Ok(())
            }
            _ => {
                let block = is_block(name);
                let strong = matches!(name, "strong" | "b" | "th") || has_class(&element, "price");
                if block {
                    self.flush();
                }
                if name == "li" {
                    self.pending.push_str("- ");
                }
                if strong {
                    self.bold += 1;
                }
                let walked = self.walk(element);
                if block {
                    self.flush();
                }
                if strong {
                    self.bold -= 1;
                }
                walked
            }
        }
    }

    fn flush(&mut self) {
        let text = collapse_whitespace(&self.pending);
        self.pending.clear();
        if text.is_empty() || text == "-" {
            return;
        }
        let style = if self.bold > 0 {
            TextStyle::BODY_BOLD
        } else {
            TextStyle::BODY
        };
        self.blocks.push(Block::Text { text, style });
    }

    fn resolve_image(&self, src: &str) -> Result<ImageSource, CatalogError> {
        if let Some(data) = src.strip_prefix("data:") {
            let Some(svg) = data.strip_prefix("image/svg+xml,") else {
                error!(src = %truncate(src, 40), "Unsupported data URI in markup");
                return Err(CatalogError::Compilation(format!(
                    "unsupported data URI '{}'",
                    truncate(src, 40)
                )));
            };
            return Ok(self.svg.parse(&percent_decode(svg)));
        }

        if src.starts_with("http://") || src.starts_with("https://") {
            let label = src
                .split("://")
                .nth(1)
                .and_then(|rest| rest.split('/').next())
                .unwrap_or_default()
                .to_string();
            return Ok(ImageSource::Remote {
                url: src.to_string(),
                label,
            });
        }

        let path = self.local_path(src);
        let bytes = fs::read(&path).map_err(|e| {
            error!(error = ?e, path = %path.display(), "Failed to read image referenced by markup");
            CatalogError::Compilation(format!(
                "image '{src}' could not be read from {}: {e}",
                path.display()
            ))
        })?;
        let mut warnings = Vec::new();
        let image = RawImage::decode_from_bytes(&bytes, &mut warnings).map_err(|e| {
            error!(error = %e, path = %path.display(), "Failed to decode image");
            CatalogError::Compilation(format!("image '{src}' could not be decoded: {e}"))
        })?;
        Ok(ImageSource::Raster(image))
    }

    fn local_path(&self, src: &str) -> PathBuf {
        let raw = src.strip_prefix("file://").unwrap_or(src);
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Downloads the remote images in `blocks` and swaps each one that loads for
/// its raster. Anything that fails stays a framed box.
fn embed_remote_images(blocks: &mut [Block], timeout: Duration) {
    let mut urls = Vec::new();
    collect_remote_urls(blocks, &mut urls);
    if urls.is_empty() {
        return;
    }
    urls.sort();
    urls.dedup();
    let requested = urls.len();

    // The blocking client must stay off async runtime threads, and compile
    // is called from within one.
    let downloaded = match thread::spawn(move || download_images(urls, timeout)).join() {
        Ok(downloaded) => downloaded,
        Err(_) => {
            warn!(requested, "Remote image download thread panicked; drawing frames instead");
            return;
        }
    };
    info!(requested, downloaded = downloaded.len(), "Remote images downloaded");
    replace_remote(blocks, &downloaded);
}

fn collect_remote_urls(blocks: &[Block], urls: &mut Vec<String>) {
    for block in blocks {
        match block {
            Block::Image(ImageSource::Remote { url, .. }) => urls.push(url.clone()),
            Block::Card(children) => collect_remote_urls(children, urls),
            _ => {}
        }
    }
}

fn download_images(urls: Vec<String>, timeout: Duration) -> HashMap<String, Vec<u8>> {
    let mut downloaded = HashMap::new();
    let client = match reqwest::blocking::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Failed to build HTTP client for remote images");
            return downloaded;
        }
    };
    for url in urls {
        match download_image(&client, &url) {
            Ok(bytes) => {
                debug!(url = %url, bytes = bytes.len(), "Remote image downloaded");
                downloaded.insert(url, bytes);
            }
            Err(reason) => {
                warn!(url = %url, reason = %reason, "Remote image unavailable; drawing a frame instead");
            }
        }
    }
    downloaded
}

fn download_image(client: &reqwest::blocking::Client, url: &str) -> Result<Vec<u8>, String> {
    let response = client.get(url).send().map_err(|e| e.to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {status}"));
    }
    let bytes = response.bytes().map_err(|e| e.to_string())?;
    Ok(bytes.to_vec())
}

fn replace_remote(blocks: &mut [Block], downloaded: &HashMap<String, Vec<u8>>) {
    for block in blocks {
        match block {
            Block::Image(image) => {
                let ImageSource::Remote { url, .. } = &*image else {
                    continue;
                };
                let Some(bytes) = downloaded.get(url) else {
                    continue;
                };
                let mut warnings = Vec::new();
                match RawImage::decode_from_bytes(bytes, &mut warnings) {
                    Ok(raw) => *image = ImageSource::Raster(raw),
                    Err(e) => {
                        warn!(url = %url, error = %e, "Remote image could not be decoded; drawing a frame instead");
                    }
                }
            }
            Block::Card(children) => replace_remote(children, downloaded),
            Block::Text { .. } | Block::Rule => {}
        }
    }
}

/// Decodes `%XX` escapes; malformed escapes are kept literally.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn rgb(r: f32, g: f32, b: f32) -> Color {
    Color::Rgb(Rgb {
        r,
        g,
        b,
        icc_profile: None,
    })
}

fn hex_color(hex: &str) -> Option<Color> {
    let channel = |i: usize| {
        hex.get(i..i + 2)
            .and_then(|h| u8::from_str_radix(h, 16).ok())
            .map(|v| v as f32 / 255.0)
    };
    Some(rgb(channel(0)?, channel(2)?, channel(4)?))
}

/// Greedy word wrap by character count; words longer than a line are split.
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn point(x: f32, y: f32) -> LinePoint {
    LinePoint {
        p: Point::new(Mm(x), Mm(y)),
        bezier: false,
    }
}

fn rect_points(x: f32, y: f32, width: f32, height: f32) -> Vec<LinePoint> {
    vec![
        point(x, y),
        point(x + width, y),
        point(x + width, y + height),
        point(x, y + height),
    ]
}

fn fill_rect(ops: &mut Vec<Op>, x: f32, y: f32, width: f32, height: f32, color: Color) {
    ops.push(Op::SetFillColor { col: color });
    ops.push(Op::DrawPolygon {
        polygon: Polygon {
            rings: vec![PolygonRing {
                points: rect_points(x, y, width, height),
            }],
            mode: PaintMode::Fill,
            winding_order: WindingOrder::NonZero,
        },
    });
}

fn stroke_rect(ops: &mut Vec<Op>, x: f32, y: f32, width: f32, height: f32, color: Color) {
    ops.push(Op::SetOutlineColor { col: color });
    ops.push(Op::SetOutlineThickness { pt: Pt(0.5) });
    ops.push(Op::DrawLine {
        line: Line {
            points: rect_points(x, y, width, height),
            is_closed: true,
        },
    });
}

/// Writes one line of text with its baseline at `y`.
fn write_line(ops: &mut Vec<Op>, x: f32, y: f32, text: &str, style: TextStyle, color: Color) {
    ops.push(Op::StartTextSection);
    ops.push(Op::SetFillColor { col: color });
    ops.push(Op::SetTextCursor {
        pos: Point::new(Mm(x), Mm(y)),
    });
    ops.push(Op::SetFontSizeBuiltinFont {
        size: Pt(style.size),
        font: style.font(),
    });
    // An empty run only registers the font on the page; printpdf would
    // write the text itself as UTF-8, which the WinAnsi font misreads.
    ops.push(Op::WriteTextBuiltinFont {
        items: Vec::new(),
        font: style.font(),
    });
    ops.push(Op::Unknown {
        key: "Tj".to_string(),
        value: vec![DictItem::String {
            data: win_ansi(text),
            literal: false,
        }],
    });
    ops.push(Op::EndTextSection);
}

/// Encodes text as Windows-1252. Characters it cannot represent become `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' | '\u{a0}'..='\u{ff}' => c as u8,
            '€' => 0x80,
            '‚' => 0x82,
            'ƒ' => 0x83,
            '„' => 0x84,
            '…' => 0x85,
            '†' => 0x86,
            '‡' => 0x87,
            'ˆ' => 0x88,
            '‰' => 0x89,
            'Š' => 0x8A,
            '‹' => 0x8B,
            'Œ' => 0x8C,
            'Ž' => 0x8E,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '˜' => 0x98,
            '™' => 0x99,
            'š' => 0x9A,
            '›' => 0x9B,
            'œ' => 0x9C,
            'ž' => 0x9E,
            'Ÿ' => 0x9F,
            _ => b'?',
        })
        .collect()
}

fn footer(ops: &mut Vec<Op>, page: usize, total: usize) {
    let style = TextStyle {
        size: 8.0,
        bold: false,
    };
    write_line(
        ops,
        PAGE_WIDTH / 2.0 - 10.0,
        MARGIN,
        &format!("Página {page} de {total}"),
        style,
        rgb(0.5, 0.5, 0.5),
    );
}

/// Top-down block flow onto fixed-size pages. `cursor` is the distance in
/// mm from the bottom edge to the top of the next block.
struct Layout<'d> {
    doc: &'d mut PdfDocument,
    pages: Vec<Vec<Op>>,
    ops: Vec<Op>,
    cursor: f32,
}

impl<'d> Layout<'d> {
    fn new(doc: &'d mut PdfDocument) -> Self {
        Self {
            doc,
            pages: Vec::new(),
            ops: Vec::new(),
            cursor: Self::top(),
        }
    }

    fn top() -> f32 {
        PAGE_HEIGHT - MARGIN
    }

    fn bottom() -> f32 {
        MARGIN + FOOTER_HEIGHT
    }

    /// Breaks the page unless `height` fits; a fresh page never breaks again.
    fn ensure_space(&mut self, height: f32) {
        if self.cursor - height < Self::bottom() && self.cursor < Self::top() {
            self.pages.push(std::mem::take(&mut self.ops));
            self.cursor = Self::top();
        }
    }

    fn finish(mut self) -> Vec<Vec<Op>> {
        self.pages.push(std::mem::take(&mut self.ops));
        self.pages
    }

    fn place(&mut self, block: &Block) {
        match block {
            Block::Text { text, style } => self.place_text(text, *style),
            Block::Image(image) => {
                self.ensure_space(IMAGE_SIZE + BLOCK_SPACING);
                let y = self.cursor - IMAGE_SIZE;
                self.draw_image(image, MARGIN, y, IMAGE_SIZE);
                self.cursor = y - BLOCK_SPACING;
            }
            Block::Rule => {
                self.ensure_space(2.0 * BLOCK_SPACING);
                let y = self.cursor - BLOCK_SPACING;
                self.ops.push(Op::SetOutlineColor {
                    col: rgb(0.7, 0.7, 0.7),
                });
                self.ops.push(Op::SetOutlineThickness { pt: Pt(0.5) });
                self.ops.push(Op::DrawLine {
                    line: Line {
                        points: vec![point(MARGIN, y), point(PAGE_WIDTH - MARGIN, y)],
                        is_closed: false,
                    },
                });
                self.cursor = y - BLOCK_SPACING;
            }
            Block::Card(children) => self.place_card(children),
        }
    }

    /// Free-flowing text may continue on the next page line by line.
    fn place_text(&mut self, text: &str, style: TextStyle) {
        let line_height = style.line_height();
        for line in wrap(text, style.chars_per_line(CONTENT_WIDTH)) {
            self.ensure_space(line_height);
            let baseline = self.cursor - style.ascent();
            write_line(&mut self.ops, MARGIN, baseline, &line, style, rgb(0.0, 0.0, 0.0));
            self.cursor -= line_height;
        }
        self.cursor -= BLOCK_SPACING;
    }

    fn place_card(&mut self, children: &[Block]) {
        let mut images = Vec::new();
        let mut texts = Vec::new();
        flatten(children, &mut images, &mut texts);

        let text_x = if images.is_empty() {
            MARGIN + CARD_PADDING
        } else {
            MARGIN + CARD_PADDING + IMAGE_SIZE + CARD_GAP
        };
        let text_width = PAGE_WIDTH - MARGIN - CARD_PADDING - text_x;
        let wrapped: Vec<(Vec<String>, TextStyle)> = texts
            .iter()
            .map(|(text, style)| (wrap(text, style.chars_per_line(text_width)), *style))
            .collect();

        let text_height: f32 = wrapped
            .iter()
            .map(|(lines, style)| lines.len() as f32 * style.line_height() + BLOCK_SPACING)
            .sum();
        let image_height = images.len() as f32 * (IMAGE_SIZE + BLOCK_SPACING);
        let height = text_height.max(image_height) + 2.0 * CARD_PADDING - BLOCK_SPACING;

        if height + BLOCK_SPACING > Self::top() - Self::bottom() {
            debug!(height, "Product card taller than a page, flowing it unframed");
            self.flow_card(&images, &wrapped);
            return;
        }

        self.ensure_space(height + BLOCK_SPACING);
        let top = self.cursor;
        stroke_rect(
            &mut self.ops,
            MARGIN,
            top - height,
            CONTENT_WIDTH,
            height,
            rgb(0.8, 0.8, 0.8),
        );

        let mut y = top - CARD_PADDING;
        for image in images {
            self.draw_image(image, MARGIN + CARD_PADDING, y - IMAGE_SIZE, IMAGE_SIZE);
            y -= IMAGE_SIZE + BLOCK_SPACING;
        }

        let mut y = top - CARD_PADDING;
        for (lines, style) in &wrapped {
            for line in lines {
                write_line(
                    &mut self.ops,
                    text_x,
                    y - style.ascent(),
                    line,
                    *style,
                    rgb(0.0, 0.0, 0.0),
                );
                y -= style.line_height();
            }
            y -= BLOCK_SPACING;
        }

        self.cursor = top - height - 2.0 * BLOCK_SPACING;
    }

    /// Images first, then text, each breaking the page on its own.
    fn flow_card(&mut self, images: &[&ImageSource], wrapped: &[(Vec<String>, TextStyle)]) {
        let x = MARGIN + CARD_PADDING;
        for image in images {
            self.ensure_space(IMAGE_SIZE + BLOCK_SPACING);
            let y = self.cursor - IMAGE_SIZE;
            self.draw_image(image, x, y, IMAGE_SIZE);
            self.cursor = y - BLOCK_SPACING;
        }
        for (lines, style) in wrapped {
            for line in lines {
                self.ensure_space(style.line_height());
                let baseline = self.cursor - style.ascent();
                write_line(&mut self.ops, x, baseline, line, *style, rgb(0.0, 0.0, 0.0));
                self.cursor -= style.line_height();
            }
            self.cursor -= BLOCK_SPACING;
        }
        self.cursor -= BLOCK_SPACING;
    }

    fn draw_image(&mut self, image: &ImageSource, x: f32, y: f32, size: f32) {
        let caption = TextStyle {
            size: 8.0,
            bold: false,
        };
        match image {
            ImageSource::Placeholder { label, fill } => {
                fill_rect(&mut self.ops, x, y, size, size, fill.clone());
                self.caption(x, y, size, label, caption, rgb(0.6, 0.6, 0.6));
            }
            ImageSource::Remote { label, .. } => {
                stroke_rect(&mut self.ops, x, y, size, size, rgb(0.6, 0.6, 0.6));
                self.caption(x, y, size, label, caption, rgb(0.4, 0.4, 0.4));
            }
            ImageSource::Raster(raw) => {
                let id = self.doc.add_image(raw);
                let longest_px = raw.width.max(raw.height).max(1) as f32;
                let natural_pt = longest_px * 72.0 / IMAGE_DPI;
                let scale = (size / PT_TO_MM) / natural_pt;
                self.ops.push(Op::UseXobject {
                    id,
                    transform: XObjectTransform {
                        translate_x: Some(Pt::from(Mm(x))),
                        translate_y: Some(Pt::from(Mm(y))),
                        scale_x: Some(scale),
                        scale_y: Some(scale),
                        dpi: Some(IMAGE_DPI),
                        ..Default::default()
                    },
                });
            }
        }
    }

    /// Roughly centered single-line caption inside a square.
    fn caption(&mut self, x: f32, y: f32, size: f32, label: &str, style: TextStyle, color: Color) {
        if label.is_empty() {
            return;
        }
        let max_chars = style.chars_per_line(size - 2.0);
        let label = truncate(label, max_chars);
        let glyph = style.size * 0.5 * PT_TO_MM;
        let width = label.chars().count() as f32 * glyph;
        let left = x + ((size - width) / 2.0).max(1.0);
        write_line(&mut self.ops, left, y + size / 2.0, &label, style, color);
    }
}

fn flatten<'b>(
    blocks: &'b [Block],
    images: &mut Vec<&'b ImageSource>,
    texts: &mut Vec<(&'b str, TextStyle)>,
) {
    for block in blocks {
        match block {
            Block::Text { text, style } => texts.push((text.as_str(), *style)),
            Block::Image(image) => images.push(image),
            Block::Rule => {}
            Block::Card(children) => flatten(children, images, texts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_breaks_on_words_and_splits_long_words() {
        assert_eq!(wrap("um dois tres", 7), vec!["um dois", "tres"]);
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert!(wrap("   ", 10).is_empty());
    }

    #[test]
    fn win_ansi_maps_latin_text_to_single_bytes() {
        assert_eq!(win_ansi("Preço"), b"Pre\xe7o".to_vec());
        assert_eq!(win_ansi("Página"), b"P\xe1gina".to_vec());
        assert_eq!(win_ansi("R$ 10 – €"), b"R$ 10 \x96 \x80".to_vec());
        assert_eq!(win_ansi("日本"), b"??".to_vec());
    }

    #[test]
    fn percent_decode_handles_escapes() {
        assert_eq!(percent_decode("%3Ctext%3ESem imagem%3C/text%3E"), "<text>Sem imagem</text>");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
    }

    #[test]
    fn placeholder_svg_caption_is_extracted() {
        let svg = SvgPlaceholder::new().unwrap();
        let decoded = percent_decode(
            crate::render::PLACEHOLDER_IMAGE
                .strip_prefix("data:image/svg+xml,")
                .unwrap(),
        );
        match svg.parse(&decoded) {
            ImageSource::Placeholder { label, .. } => assert_eq!(label, "Sem imagem"),
            _ => panic!("expected placeholder"),
        }
    }
}
