//! Pairing code display.

use qrcode::render::unicode;
use qrcode::QrCode;
use std::io::Write;

use crate::config::QrFormat;

/// Render a pairing string as a Unicode half-block QR code.
pub fn render(code: &str) -> Result<String, qrcode::types::QrError> {
    let qr = QrCode::new(code.as_bytes())?;
    Ok(qr
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .quiet_zone(true)
        .build())
}

/// Show one pairing code in the chosen format.
///
/// `Text` writes the raw string to stdout (one line per code); `Terminal`
/// draws the QR code on stderr.
pub fn show(format: QrFormat, code: &str) {
    match format {
        QrFormat::Text => {
            if let Err(e) = write_code(&mut std::io::stdout().lock(), code) {
                tracing::warn!("failed to write pairing code to stdout: {}", e);
            }
        }
        QrFormat::Terminal => match render(code) {
            Ok(image) => {
                eprintln!();
                eprintln!("Scan this QR code with your phone (Settings > Linked Devices):");
                eprintln!("{}", image);
            }
            Err(e) => {
                tracing::warn!("failed to render QR code: {}", e);
                eprintln!("Pairing code: {}", code);
            }
        },
    }
}

fn write_code<W: Write>(out: &mut W, code: &str) -> std::io::Result<()> {
    writeln!(out, "{}", code)?;
    out.flush()
}
