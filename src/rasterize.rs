//! Page images from scanned PDFs.
//!
//! A scanned PDF page is a single full-page image XObject. Each page yields
//! its largest image, decoded in memory; pages without one become page-scoped
//! errors so the rest of the document still goes through.

use crate::error::PipelineError;
use crate::raster::RasterImage;
use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// Guard against cyclic /Parent chains in malformed page trees
const MAX_TREE_DEPTH: usize = 32;

/// PDF magic bytes
pub fn is_pdf(data: &[u8]) -> bool {
    data.starts_with(b"%PDF-")
}

/// One entry per PDF page, in page order.
///
/// The outer error covers documents that cannot be parsed or have no pages.
pub fn pdf_pages(data: &[u8]) -> Result<Vec<Result<RasterImage, PipelineError>>, PipelineError> {
    let doc = Document::load_mem(data)
        .map_err(|e| PipelineError::ImageRead(format!("Failed to load PDF: {}", e)))?;

    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(PipelineError::NoPages);
    }
    tracing::debug!("PDF has {} page(s)", pages.len());

    // BTreeMap keyed by 1-based page number, so iteration is page order
    Ok(pages
        .into_iter()
        .map(|(number, page_id)| {
            page_image(&doc, page_id)
                .map(RasterImage::from_dynamic)
                .map_err(|e| {
                    tracing::warn!("No usable image on PDF page {}: {}", number, e);
                    e
                })
        })
        .collect())
}

fn page_image(doc: &Document, page_id: ObjectId) -> Result<DynamicImage, PipelineError> {
    let resources = page_resources(doc, page_id)
        .ok_or_else(|| PipelineError::ImageRead("Page has no resources".to_string()))?;

    let xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
        .ok_or_else(|| PipelineError::ImageRead("Page has no image".to_string()))?;

    let largest = xobjects
        .iter()
        .filter_map(|(_, obj)| resolve_stream(doc, obj))
        .filter(|stream| {
            stream
                .dict
                .get(b"Subtype")
                .and_then(Object::as_name)
                .is_ok_and(|name| name == b"Image")
        })
        .max_by_key(|stream| {
            let w = dict_int(&stream.dict, b"Width").unwrap_or(0);
            let h = dict_int(&stream.dict, b"Height").unwrap_or(0);
            w.saturating_mul(h)
        })
        .ok_or_else(|| PipelineError::ImageRead("Page has no image".to_string()))?;

    extract_image_from_stream(doc, largest)
}

/// Page resources, inherited from ancestors in the page tree when the page
/// itself has none.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(resources) = node.get(b"Resources") {
            return resolve_dict(doc, resources);
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Dictionary(dict) => Some(dict),
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        _ => None,
    }
}

fn resolve_stream<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Stream> {
    match obj {
        Object::Stream(stream) => Some(stream),
        Object::Reference(id) => doc.get_object(*id).ok()?.as_stream().ok(),
        _ => None,
    }
}

fn dict_int(dict: &Dictionary, key: &[u8]) -> Option<u32> {
    dict.get(key)
        .ok()
        .and_then(|v| v.as_i64().ok())
        .and_then(|v| u32::try_from(v).ok())
}

fn filter_names(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_name().ok().map(|n| n.to_vec()))
            .collect(),
        _ => Vec::new(),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    Other(String),
}

/// Extract an image from a PDF image XObject stream
fn extract_image_from_stream(doc: &Document, stream: &Stream) -> Result<DynamicImage, PipelineError> {
    let filters = filter_names(&stream.dict);

    // JPEG and JPEG 2000 streams hold a complete encoded image
    if filters
        .iter()
        .any(|f| f.as_slice() == b"DCTDecode" || f.as_slice() == b"JPXDecode")
    {
        return image::load_from_memory(&stream.content).map_err(|e| {
            PipelineError::ImageRead(format!("Failed to decode embedded image: {}", e))
        });
    }

    let width = dict_int(&stream.dict, b"Width")
        .ok_or_else(|| PipelineError::ImageRead("Missing image width".to_string()))?;
    let height = dict_int(&stream.dict, b"Height")
        .ok_or_else(|| PipelineError::ImageRead("Missing image height".to_string()))?;

    let data = if filters.is_empty() {
        stream.content.clone()
    } else {
        stream.decompressed_content().map_err(|e| {
            PipelineError::ImageRead(format!("Failed to decompress image: {}", e))
        })?
    };

    let color_space = get_color_space(doc, &stream.dict);
    let bits_per_component = dict_int(&stream.dict, b"BitsPerComponent").unwrap_or(8);

    tracing::debug!(
        "PDF image: {}x{}, {} bits, color_space={:?}, data_len={}",
        width,
        height,
        bits_per_component,
        color_space,
        data.len()
    );

    let pixels = width as usize * height as usize;
    let too_short = |expected: usize| {
        PipelineError::ImageRead(format!(
            "Image data too short: data_len={}, expected={}",
            data.len(),
            expected
        ))
    };

    match (color_space, bits_per_component) {
        (ColorSpace::Gray, 8) => {
            let img = GrayImage::from_raw(width, height, data[..pixels.min(data.len())].to_vec())
                .ok_or_else(|| too_short(pixels))?;
            Ok(DynamicImage::ImageLuma8(img))
        }
        (ColorSpace::Gray, 1) => {
            let row_bytes = (width as usize).div_ceil(8);
            if data.len() < row_bytes * height as usize {
                return Err(too_short(row_bytes * height as usize));
            }
            Ok(DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
                let byte = data[y as usize * row_bytes + x as usize / 8];
                let bit = (byte >> (7 - (x % 8))) & 1;
                image::Luma([if bit == 1 { 255 } else { 0 }])
            })))
        }
        (ColorSpace::Rgb, 8) => {
            let expected = pixels * 3;
            let img = RgbImage::from_raw(width, height, data[..expected.min(data.len())].to_vec())
                .ok_or_else(|| too_short(expected))?;
            Ok(DynamicImage::ImageRgb8(img))
        }
        (ColorSpace::Cmyk, 8) => {
            let expected = pixels * 4;
            if data.len() < expected {
                return Err(too_short(expected));
            }
            let rgb_data = data[..expected]
                .chunks_exact(4)
                .flat_map(|chunk| {
                    let k = 1.0 - chunk[3] as f32 / 255.0;
                    [0, 1, 2].map(|i| ((1.0 - chunk[i] as f32 / 255.0) * k * 255.0) as u8)
                })
                .collect();
            let img = RgbImage::from_raw(width, height, rgb_data)
                .ok_or_else(|| too_short(expected))?;
            Ok(DynamicImage::ImageRgb8(img))
        }
        (space, bits) => Err(PipelineError::UnsupportedFormat(format!(
            "PDF image with color space {:?} at {} bits per component",
            space, bits
        ))),
    }
}

/// Resolve the color space of an image, following references and looking
/// inside ICC profiles for their component count.
fn get_color_space(doc: &Document, dict: &Dictionary) -> ColorSpace {
    let resolved = match dict.get(b"ColorSpace") {
        Ok(Object::Reference(id)) => doc.get_object(*id).ok(),
        Ok(obj) => Some(obj),
        Err(_) => None,
    };

    let Some(cs) = resolved else {
        return ColorSpace::Rgb;
    };

    if let Ok(name) = cs.as_name() {
        return color_space_from_name(name, None);
    }

    if let Ok(array) = cs.as_array() {
        if let Some(name) = array.first().and_then(|first| first.as_name().ok()) {
            let components = array
                .get(1)
                .and_then(|profile| resolve_stream(doc, profile))
                .and_then(|profile| dict_int(&profile.dict, b"N"));
            return color_space_from_name(name, components);
        }
    }

    ColorSpace::Rgb
}

fn color_space_from_name(name: &[u8], components: Option<u32>) -> ColorSpace {
    match (name, components) {
        (b"DeviceGray" | b"CalGray" | b"G", _) => ColorSpace::Gray,
        (b"DeviceRGB" | b"CalRGB" | b"RGB", _) => ColorSpace::Rgb,
        (b"DeviceCMYK" | b"CMYK", _) => ColorSpace::Cmyk,
        (b"ICCBased", Some(1)) => ColorSpace::Gray,
        (b"ICCBased", Some(4)) => ColorSpace::Cmyk,
        (b"ICCBased", _) => ColorSpace::Rgb,
        (other, _) => ColorSpace::Other(String::from_utf8_lossy(other).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn name(n: &str) -> Object {
        Object::Name(n.as_bytes().to_vec())
    }

    fn image_stream(width: i64, height: i64, color_space: &str, filter: Option<&str>, content: Vec<u8>) -> Stream {
        let mut dict = Dictionary::new();
        dict.set("Type", name("XObject"));
        dict.set("Subtype", name("Image"));
        dict.set("Width", Object::Integer(width));
        dict.set("Height", Object::Integer(height));
        dict.set("ColorSpace", name(color_space));
        dict.set("BitsPerComponent", Object::Integer(8));
        if let Some(filter) = filter {
            dict.set("Filter", name(filter));
        }
        Stream::new(dict, content)
    }

    /// Build a PDF whose pages each hold the given image streams. Resources
    /// of the first page are placed on the page tree node to exercise
    /// inheritance.
    fn build_pdf(pages: Vec<Vec<Stream>>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        let mut inherited = None;

        for (i, images) in pages.into_iter().enumerate() {
            let mut xobjects = Dictionary::new();
            for (j, stream) in images.into_iter().enumerate() {
                let id = doc.add_object(Object::Stream(stream));
                xobjects.set(format!("Im{}", j), Object::Reference(id));
            }
            let mut resources = Dictionary::new();
            resources.set("XObject", Object::Dictionary(xobjects));

            let mut page = Dictionary::new();
            page.set("Type", name("Page"));
            page.set("Parent", Object::Reference(pages_id));
            if i == 0 {
                inherited = Some(resources);
            } else {
                page.set("Resources", Object::Dictionary(resources));
            }
            kids.push(Object::Reference(doc.add_object(Object::Dictionary(page))));
        }

        let mut pages_dict = Dictionary::new();
        pages_dict.set("Type", name("Pages"));
        pages_dict.set("Count", Object::Integer(kids.len() as i64));
        pages_dict.set("Kids", Object::Array(kids));
        if let Some(resources) = inherited {
            pages_dict.set("Resources", Object::Dictionary(resources));
        }
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

        let mut catalog = Dictionary::new();
        catalog.set("Type", name("Catalog"));
        catalog.set("Pages", Object::Reference(pages_id));
        let catalog_id = doc.add_object(Object::Dictionary(catalog));
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    #[test]
    fn test_is_pdf() {
        assert!(is_pdf(b"%PDF-1.7\n..."));
        assert!(!is_pdf(b"\x89PNG\r\n"));
        assert!(!is_pdf(b""));
    }

    #[test]
    fn test_pages_in_order_with_largest_image_and_errors_in_place() {
        let jpeg = {
            let img = RgbImage::from_pixel(12, 6, image::Rgb([200, 10, 10]));
            let mut buf = Vec::new();
            img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
                .unwrap();
            buf
        };

        let pdf = build_pdf(vec![
            vec![image_stream(4, 2, "DeviceGray", None, vec![0, 50, 100, 150, 200, 250, 255, 0])],
            vec![],
            vec![
                image_stream(1, 1, "DeviceRGB", None, vec![1, 2, 3]),
                image_stream(12, 6, "DeviceRGB", Some("DCTDecode"), jpeg),
            ],
        ]);
        assert!(is_pdf(&pdf));

        let pages = pdf_pages(&pdf).unwrap();
        assert_eq!(pages.len(), 3);

        let first = pages[0].as_ref().unwrap();
        assert_eq!((first.width(), first.height(), first.channels()), (4, 2, 1));
        assert_eq!(first.as_dynamic().to_luma8().get_pixel(1, 0).0[0], 50);

        assert!(matches!(pages[1], Err(PipelineError::ImageRead(_))));

        let third = pages[2].as_ref().unwrap();
        assert_eq!((third.width(), third.height(), third.channels()), (12, 6, 3));
    }

    #[test]
    fn test_cmyk_image_is_converted() {
        let pdf = build_pdf(vec![vec![image_stream(
            1,
            1,
            "DeviceCMYK",
            None,
            vec![0, 0, 0, 0],
        )]]);
        let pages = pdf_pages(&pdf).unwrap();
        let page = pages[0].as_ref().unwrap();
        assert_eq!(page.as_dynamic().to_rgb8().get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn test_garbage_is_not_a_pdf() {
        assert!(matches!(
            pdf_pages(b"%PDF-1.4 nothing else"),
            Err(PipelineError::ImageRead(_))
        ));
    }

    #[test]
    fn test_color_space_names() {
        assert_eq!(color_space_from_name(b"ICCBased", Some(1)), ColorSpace::Gray);
        assert_eq!(color_space_from_name(b"ICCBased", None), ColorSpace::Rgb);
        assert_eq!(
            color_space_from_name(b"Indexed", None),
            ColorSpace::Other("Indexed".to_string())
        );
    }
}
