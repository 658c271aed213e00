//! VideoToolbox interop probe - prints the supported CoreVideo formats
//!
//! Usage: hwdec-probe [OPTIONS]
//!
//! Options:
//!   --format <name>       Preferred output format (default: nv12)
//!   --min-gl <ver>        Minimum OpenGL version (default: 3.0)
//!   --json                Print a JSON report instead of text
//!
//! Examples:
//!   hwdec-probe
//!   hwdec-probe --format uyvy --json
//!   RUST_LOG=hwdec_gl=debug hwdec-probe --min-gl 4.1

use anyhow::Result;
use hwdec_gl::{
    formats, lookup_by_image_format, GlVersion, HwdecError, HwdecOptions, ImageFormat,
    PixelFormatDescriptor,
};
use std::env;

struct Args {
    format: ImageFormat,
    min_gl: GlVersion,
    json: bool,
}

fn parse_args() -> Result<Option<Args>> {
    let args: Vec<String> = env::args().collect();
    let defaults = HwdecOptions::default();

    let mut format = defaults.videotoolbox_format;
    let mut min_gl = defaults.min_gl_version;
    let mut json = false;

    let mut i = 1;
    while i < args.len() {
        let arg = &args[i];

        if arg == "--format" {
            let Some(value) = args.get(i + 1) else {
                anyhow::bail!("--format requires a value");
            };
            format = value.parse()?;
            i += 2;
            continue;
        }

        if arg == "--min-gl" {
            let Some(value) = args.get(i + 1) else {
                anyhow::bail!("--min-gl requires a value");
            };
            min_gl = value.parse()?;
            i += 2;
            continue;
        }

        if arg == "--json" {
            json = true;
            i += 1;
            continue;
        }

        if arg == "--help" || arg == "-h" {
            return Ok(None);
        }

        anyhow::bail!("unknown argument: {arg}");
    }

    Ok(Some(Args {
        format,
        min_gl,
        json,
    }))
}

fn print_usage() {
    println!("Usage: hwdec-probe [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --format <name>       Preferred output format (default: nv12)");
    println!("  --min-gl <ver>        Minimum OpenGL version (default: 3.0)");
    println!("  --json                Print a JSON report instead of text");
    println!();
    println!("Formats:");
    for desc in formats() {
        println!("  {}", desc.image_format);
    }
}

fn format_json(desc: &PixelFormatDescriptor) -> serde_json::Value {
    let planes: Vec<_> = desc
        .planes
        .iter()
        .map(|p| {
            serde_json::json!({
                "format": format!("{:?}", p.format),
                "type": format!("{:?}", p.sample_type),
                "internal_format": format!("{:?}", p.internal_format),
                "swizzle": p.swizzle.as_str(),
            })
        })
        .collect();
    serde_json::json!({
        "cv_format": desc.hw_format.to_string(),
        "image_format": desc.image_format.name(),
        "planes": planes,
    })
}

#[cfg(all(target_os = "macos", feature = "videotoolbox"))]
fn check_context(min_gl: GlVersion) -> Result<(), HwdecError> {
    let gl = hwdec_gl::videotoolbox::CglContext::current()?;
    hwdec_gl::check_capabilities(&gl, min_gl)
}

#[cfg(not(all(target_os = "macos", feature = "videotoolbox")))]
fn check_context(_min_gl: GlVersion) -> Result<(), HwdecError> {
    Err(HwdecError::NoCurrentContext)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hwdec_gl=info".parse()?),
        )
        .init();

    let args = match parse_args()? {
        Some(a) => a,
        None => {
            print_usage();
            return Ok(());
        }
    };

    let preferred = lookup_by_image_format(args.format).map(|d| d.hw_format);
    let capability = check_context(args.min_gl);

    if args.json {
        let report = serde_json::json!({
            "formats": formats().iter().map(format_json).collect::<Vec<_>>(),
            "preferred": {
                "image_format": args.format.name(),
                "cv_format": preferred.map(|f| f.to_string()),
            },
            "min_gl": args.min_gl.to_string(),
            "capability": match &capability {
                Ok(()) => serde_json::json!({ "ok": true }),
                Err(e) => serde_json::json!({ "ok": false, "error": e.to_string() }),
            },
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Supported CoreVideo formats:");
    for desc in formats() {
        let swizzles: Vec<_> = desc
            .planes
            .iter()
            .filter(|p| !p.swizzle.is_identity())
            .map(|p| p.swizzle.as_str())
            .collect();
        println!(
            "  {} -> {:<8} {} plane(s){}",
            desc.hw_format,
            desc.image_format,
            desc.plane_count(),
            if swizzles.is_empty() {
                String::new()
            } else {
                format!(", swizzle {}", swizzles.join(","))
            }
        );
    }
    println!();

    match preferred {
        Some(f) => println!("Preferred format: {} ({})", args.format, f),
        None => println!("Preferred format: {} (no CoreVideo equivalent)", args.format),
    }

    match capability {
        Ok(()) => tracing::info!("OpenGL context supports IOSurface import (>= {})", args.min_gl),
        Err(e) => tracing::warn!("OpenGL capability check: {e}"),
    }

    Ok(())
}
