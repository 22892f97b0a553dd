//! Wire-level fixtures for the fake job system

#![allow(dead_code)]

use std::io::Cursor;

use base64::Engine;
use serde_json::{json, Value};

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([240, 240, 240]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 200, 200]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Jpeg)
        .expect("encode jpeg");
    out.into_inner()
}

fn rect(x: f64, y: f64, w: f64, h: f64) -> Value {
    json!([[x, y], [x + w, y], [x + w, y + h], [x, y + h]])
}

/// One detection exactly as the engine serializes it.
pub fn detection(pii_type: &str, text: &str, x: f64, y: f64, confidence: f64) -> Value {
    json!({
        "type": pii_type,
        "text": text,
        "bbox": rect(x, y, 60.0, 14.0),
        "confidence": confidence,
    })
}

/// A masked Aadhaar card: five detections, the two below 0.8 flagged.
pub fn aadhaar_card_result() -> Value {
    let detections = vec![
        detection("AADHAAR", "1234 5678 9012", 20.0, 80.0, 0.97),
        detection("NAME", "Ravi Kumar", 20.0, 20.0, 0.93),
        detection("DOB", "01/01/1990", 20.0, 40.0, 0.88),
        detection("ADDRESS", "12 MG Road", 20.0, 60.0, 0.71),
        detection("PHONE", "+91 98765 43210", 120.0, 20.0, 0.64),
    ];
    let flagged = detections[3..].to_vec();
    json!({
        "detections": detections,
        "flagged": flagged,
        "image_base64": base64::engine::general_purpose::STANDARD.encode(png_bytes(240, 120)),
        "languages": ["en", "hi"],
    })
}

/// Engine output with a type this client has never seen and no text.
pub fn unusual_result() -> Value {
    json!({
        "detections": [
            {
                "type": "PASSPORT",
                "bbox": rect(10.0, 10.0, 30.0, 10.0),
                "confidence": 0.5,
            }
        ],
        "flagged": [
            {
                "type": "PASSPORT",
                "bbox": rect(10.0, 10.0, 30.0, 10.0),
                "confidence": 0.5,
            }
        ],
        "image_base64": base64::engine::general_purpose::STANDARD.encode(jpeg_bytes(64, 64)),
        "languages": ["ml"],
    })
}
