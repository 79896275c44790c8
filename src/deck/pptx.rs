//! Minimal PresentationML package writer.
//!
//! A `.pptx` is a zip of XML parts. We emit one master, one blank layout,
//! one theme, the slides and their media; enough for PowerPoint, Keynote
//! and LibreOffice to open the deck.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{Seek, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::layout::{Caption, DeckSpec, Rect, SlideSpec, Visual, CAPTION_RED, PLACEHOLDER_FILL, PLACEHOLDER_LINE};
use super::DeckError;

const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const CT_BASE: &str = "application/vnd.openxmlformats-officedocument";

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const CAPTION_FONT: &str = "Microsoft YaHei";

/// Escape text for XML element content and attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// A picture stored under `ppt/media/`.
struct Media {
    part_name: String,
    bytes: Vec<u8>,
}

fn media_extension(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "jpg" || ext == "jpeg" => "jpeg".to_string(),
        Some(ext) if ext == "gif" || ext == "bmp" => ext,
        _ => "png".to_string(),
    }
}

/// Write `deck` to `path`.
pub fn write_deck(deck: &DeckSpec, path: &Path) -> Result<(), DeckError> {
    let file = File::create(path).map_err(|source| DeckError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write_package(deck, file)?;
    log::debug!("Wrote {} slide(s) to {}", deck.slides.len(), path.display());
    Ok(())
}

/// Write the package to any seekable writer.
pub fn write_package<W: Write + Seek>(deck: &DeckSpec, writer: W) -> Result<(), DeckError> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut media = Vec::new();
    let mut slides = Vec::with_capacity(deck.slides.len());
    for slide in &deck.slides {
        slides.push(render_slide(slide, &mut media)?);
    }

    let mut put = |name: &str, bytes: &[u8]| -> Result<(), DeckError> {
        zip.start_file(name, options)?;
        zip.write_all(bytes).map_err(|source| DeckError::Io {
            path: name.into(),
            source,
        })?;
        Ok(())
    };

    put("[Content_Types].xml", content_types(slides.len()).as_bytes())?;
    put("_rels/.rels", root_rels().as_bytes())?;
    put("ppt/presentation.xml", presentation(deck, slides.len()).as_bytes())?;
    put("ppt/_rels/presentation.xml.rels", presentation_rels(slides.len()).as_bytes())?;
    put("ppt/slideMasters/slideMaster1.xml", SLIDE_MASTER.as_bytes())?;
    put("ppt/slideMasters/_rels/slideMaster1.xml.rels", slide_master_rels().as_bytes())?;
    put("ppt/slideLayouts/slideLayout1.xml", SLIDE_LAYOUT.as_bytes())?;
    put("ppt/slideLayouts/_rels/slideLayout1.xml.rels", slide_layout_rels().as_bytes())?;
    put("ppt/theme/theme1.xml", THEME.as_bytes())?;

    for (i, (xml, rels)) in slides.iter().enumerate() {
        let n = i + 1;
        put(&format!("ppt/slides/slide{}.xml", n), xml.as_bytes())?;
        put(&format!("ppt/slides/_rels/slide{}.xml.rels", n), rels.as_bytes())?;
    }
    for m in &media {
        put(&format!("ppt/media/{}", m.part_name), &m.bytes)?;
    }

    zip.finish()?;
    Ok(())
}

fn content_types(slide_count: usize) -> String {
    let mut xml = format!(
        "{XML_DECL}<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
         <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
         <Default Extension=\"xml\" ContentType=\"application/xml\"/>\
         <Default Extension=\"png\" ContentType=\"image/png\"/>\
         <Default Extension=\"jpeg\" ContentType=\"image/jpeg\"/>\
         <Default Extension=\"gif\" ContentType=\"image/gif\"/>\
         <Default Extension=\"bmp\" ContentType=\"image/bmp\"/>\
         <Override PartName=\"/ppt/presentation.xml\" ContentType=\"{CT_BASE}.presentationml.presentation.main+xml\"/>\
         <Override PartName=\"/ppt/slideMasters/slideMaster1.xml\" ContentType=\"{CT_BASE}.presentationml.slideMaster+xml\"/>\
         <Override PartName=\"/ppt/slideLayouts/slideLayout1.xml\" ContentType=\"{CT_BASE}.presentationml.slideLayout+xml\"/>\
         <Override PartName=\"/ppt/theme/theme1.xml\" ContentType=\"{CT_BASE}.theme+xml\"/>"
    );
    for n in 1..=slide_count {
        let _ = write!(
            xml,
            "<Override PartName=\"/ppt/slides/slide{n}.xml\" ContentType=\"{CT_BASE}.presentationml.slide+xml\"/>"
        );
    }
    xml.push_str("</Types>");
    xml
}

fn relationships(entries: &[(String, &str, String)]) -> String {
    let mut xml = format!("{XML_DECL}<Relationships xmlns=\"{NS_REL}\">");
    for (id, kind, target) in entries {
        let _ = write!(
            xml,
            "<Relationship Id=\"{id}\" Type=\"{REL_BASE}/{kind}\" Target=\"{}\"/>",
            escape(target)
        );
    }
    xml.push_str("</Relationships>");
    xml
}

fn root_rels() -> String {
    relationships(&[("rId1".into(), "officeDocument", "ppt/presentation.xml".into())])
}

/// rId1 is the master, rId2 the theme, slides start at rId3.
fn presentation_rels(slide_count: usize) -> String {
    let mut entries = vec![
        ("rId1".to_string(), "slideMaster", "slideMasters/slideMaster1.xml".to_string()),
        ("rId2".to_string(), "theme", "theme/theme1.xml".to_string()),
    ];
    for n in 1..=slide_count {
        entries.push((format!("rId{}", n + 2), "slide", format!("slides/slide{}.xml", n)));
    }
    relationships(&entries)
}

fn slide_master_rels() -> String {
    relationships(&[
        ("rId1".into(), "slideLayout", "../slideLayouts/slideLayout1.xml".into()),
        ("rId2".into(), "theme", "../theme/theme1.xml".into()),
    ])
}

fn slide_layout_rels() -> String {
    relationships(&[("rId1".into(), "slideMaster", "../slideMasters/slideMaster1.xml".into())])
}

fn presentation(deck: &DeckSpec, slide_count: usize) -> String {
    let mut xml = format!(
        "{XML_DECL}<p:presentation xmlns:a=\"{NS_A}\" xmlns:r=\"{NS_R}\" xmlns:p=\"{NS_P}\" saveSubsetFonts=\"1\">\
         <p:sldMasterIdLst><p:sldMasterId id=\"2147483648\" r:id=\"rId1\"/></p:sldMasterIdLst>"
    );
    if slide_count > 0 {
        xml.push_str("<p:sldIdLst>");
        for n in 1..=slide_count {
            let _ = write!(xml, "<p:sldId id=\"{}\" r:id=\"rId{}\"/>", 255 + n, n + 2);
        }
        xml.push_str("</p:sldIdLst>");
    }
    let _ = write!(
        xml,
        "<p:sldSz cx=\"{}\" cy=\"{}\"/><p:notesSz cx=\"6858000\" cy=\"9144000\"/></p:presentation>",
        deck.size.cx, deck.size.cy
    );
    xml
}

fn xfrm(rect: &Rect) -> String {
    format!(
        "<a:xfrm><a:off x=\"{}\" y=\"{}\"/><a:ext cx=\"{}\" cy=\"{}\"/></a:xfrm>",
        rect.x, rect.y, rect.cx, rect.cy
    )
}

fn picture_xml(id: usize, rel_id: &str, rect: &Rect) -> String {
    format!(
        "<p:pic><p:nvPicPr><p:cNvPr id=\"{id}\" name=\"Picture {id}\"/>\
         <p:cNvPicPr><a:picLocks noChangeAspect=\"1\"/></p:cNvPicPr><p:nvPr/></p:nvPicPr>\
         <p:blipFill><a:blip r:embed=\"{rel_id}\"/><a:stretch><a:fillRect/></a:stretch></p:blipFill>\
         <p:spPr>{}<a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></p:spPr></p:pic>",
        xfrm(rect)
    )
}

fn placeholder_xml(id: usize, rect: &Rect) -> String {
    format!(
        "<p:sp><p:nvSpPr><p:cNvPr id=\"{id}\" name=\"Rectangle {id}\"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr>\
         <p:spPr>{}<a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom>\
         <a:solidFill><a:srgbClr val=\"{PLACEHOLDER_FILL}\"/></a:solidFill>\
         <a:ln><a:solidFill><a:srgbClr val=\"{PLACEHOLDER_LINE}\"/></a:solidFill></a:ln></p:spPr></p:sp>",
        xfrm(rect)
    )
}

fn caption_xml(id: usize, caption: &Caption) -> String {
    let size = caption.size_pt * 100;
    let mut xml = format!(
        "<p:sp><p:nvSpPr><p:cNvPr id=\"{id}\" name=\"TextBox {id}\"/><p:cNvSpPr txBox=\"1\"/><p:nvPr/></p:nvSpPr>\
         <p:spPr>{}<a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom><a:noFill/></p:spPr>\
         <p:txBody><a:bodyPr wrap=\"square\" rtlCol=\"0\"><a:spAutoFit/></a:bodyPr><a:lstStyle/>",
        xfrm(&caption.rect)
    );
    for line in &caption.lines {
        let _ = write!(
            xml,
            "<a:p><a:pPr algn=\"ctr\"/><a:r><a:rPr lang=\"zh-CN\" sz=\"{size}\" b=\"1\" dirty=\"0\">\
             <a:solidFill><a:srgbClr val=\"{CAPTION_RED}\"/></a:solidFill>\
             <a:latin typeface=\"{CAPTION_FONT}\"/><a:ea typeface=\"{CAPTION_FONT}\"/></a:rPr>\
             <a:t>{}</a:t></a:r></a:p>",
            escape(line)
        );
    }
    xml.push_str("</p:txBody></p:sp>");
    xml
}

/// Render one slide and its relationships, collecting pictures into `media`.
fn render_slide(slide: &SlideSpec, media: &mut Vec<Media>) -> Result<(String, String), DeckError> {
    let mut shapes = String::new();
    let mut rels = vec![(
        "rId1".to_string(),
        "slideLayout",
        "../slideLayouts/slideLayout1.xml".to_string(),
    )];
    // Shape id 1 is the group root.
    let mut next_id = 2;

    for cell in &slide.cells {
        match &cell.visual {
            Visual::Picture { path, rect } => {
                let bytes = std::fs::read(path).map_err(|source| DeckError::Io {
                    path: path.clone(),
                    source,
                })?;
                let part_name = format!("image{}.{}", media.len() + 1, media_extension(path));
                let rel_id = format!("rId{}", rels.len() + 1);
                rels.push((rel_id.clone(), "image", format!("../media/{}", part_name)));
                media.push(Media { part_name, bytes });
                shapes.push_str(&picture_xml(next_id, &rel_id, rect));
            }
            Visual::Placeholder { rect } => shapes.push_str(&placeholder_xml(next_id, rect)),
            Visual::None => {}
        }
        next_id += 1;
        shapes.push_str(&caption_xml(next_id, &cell.caption));
        next_id += 1;
    }

    let xml = format!(
        "{XML_DECL}<p:sld xmlns:a=\"{NS_A}\" xmlns:r=\"{NS_R}\" xmlns:p=\"{NS_P}\"><p:cSld><p:spTree>\
         <p:nvGrpSpPr><p:cNvPr id=\"1\" name=\"\"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>\
         <p:grpSpPr><a:xfrm><a:off x=\"0\" y=\"0\"/><a:ext cx=\"0\" cy=\"0\"/>\
         <a:chOff x=\"0\" y=\"0\"/><a:chExt cx=\"0\" cy=\"0\"/></a:xfrm></p:grpSpPr>\
         {shapes}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"
    );
    Ok((xml, relationships(&rels)))
}

const SLIDE_MASTER: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<p:sldMaster xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" "#,
    r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" "#,
    r#"xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">"#,
    r#"<p:cSld><p:bg><p:bgRef idx="1001"><a:schemeClr val="bg1"/></p:bgRef></p:bg><p:spTree>"#,
    r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>"#,
    r#"<p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>"#,
    r#"</p:spTree></p:cSld>"#,
    r#"<p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" "#,
    r#"accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/>"#,
    r#"<p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst>"#,
    r#"<p:txStyles><p:titleStyle/><p:bodyStyle/><p:otherStyle/></p:txStyles>"#,
    r#"</p:sldMaster>"#
);

const SLIDE_LAYOUT: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<p:sldLayout xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" "#,
    r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" "#,
    r#"xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" type="blank" preserve="1">"#,
    r#"<p:cSld name="Blank"><p:spTree>"#,
    r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>"#,
    r#"<p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>"#,
    r#"</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#
);

const THEME: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office Theme"><a:themeElements>"#,
    r#"<a:clrScheme name="Office">"#,
    r#"<a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1>"#,
    r#"<a:lt1><a:sysClr val="window" lastClr="FFFFFF"/></a:lt1>"#,
    r#"<a:dk2><a:srgbClr val="44546A"/></a:dk2><a:lt2><a:srgbClr val="E7E6E6"/></a:lt2>"#,
    r#"<a:accent1><a:srgbClr val="4472C4"/></a:accent1><a:accent2><a:srgbClr val="ED7D31"/></a:accent2>"#,
    r#"<a:accent3><a:srgbClr val="A5A5A5"/></a:accent3><a:accent4><a:srgbClr val="FFC000"/></a:accent4>"#,
    r#"<a:accent5><a:srgbClr val="5B9BD5"/></a:accent5><a:accent6><a:srgbClr val="70AD47"/></a:accent6>"#,
    r#"<a:hlink><a:srgbClr val="0563C1"/></a:hlink><a:folHlink><a:srgbClr val="954F72"/></a:folHlink>"#,
    r#"</a:clrScheme>"#,
    r#"<a:fontScheme name="Office">"#,
    r#"<a:majorFont><a:latin typeface="Calibri Light"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont>"#,
    r#"<a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont>"#,
    r#"</a:fontScheme>"#,
    r#"<a:fmtScheme name="Office"><a:fillStyleLst>"#,
    r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#,
    r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#,
    r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#,
    r#"</a:fillStyleLst><a:lnStyleLst>"#,
    r#"<a:ln w="6350"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln>"#,
    r#"<a:ln w="12700"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln>"#,
    r#"<a:ln w="19050"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln>"#,
    r#"</a:lnStyleLst><a:effectStyleLst>"#,
    r#"<a:effectStyle><a:effectLst/></a:effectStyle>"#,
    r#"<a:effectStyle><a:effectLst/></a:effectStyle>"#,
    r#"<a:effectStyle><a:effectLst/></a:effectStyle>"#,
    r#"</a:effectStyleLst><a:bgFillStyleLst>"#,
    r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#,
    r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#,
    r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#,
    r#"</a:bgFillStyleLst></a:fmtScheme>"#,
    r#"</a:themeElements><a:objectDefaults/><a:extraClrSchemeLst/></a:theme>"#
);
