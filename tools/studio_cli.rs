//! Studio Generation CLI
//!
//! A standalone tool to run an image generation through the full engine
//! without the UI shell.
//!
//! Usage:
//!   cargo run --bin studio_cli -- <prompt> [aspect_ratio] [output_path]
//!
//! Examples:
//!   GEMINI_API_KEY=... cargo run --bin studio_cli -- "a quiet harbor at dawn"
//!   GEMINI_API_KEY=... cargo run --bin studio_cli -- "a quiet harbor" 16:9 harbor.png

use std::env;
use std::fs;
use std::sync::Arc;

use image_studio_lib::commands::Studio;
use image_studio_lib::config::StudioConfig;
use image_studio_lib::encoding;
use image_studio_lib::gemini::GeminiClient;
use image_studio_lib::prompt::AspectRatio;
use image_studio_lib::session::SessionEvent;
use image_studio_lib::storage::FileStorage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Studio Generation CLI");
        eprintln!();
        eprintln!("Usage: studio_cli <prompt> [aspect_ratio] [output_path]");
        eprintln!("  aspect_ratio: 1:1 | 16:9 | 9:16 | 4:3 | 3:4 (default 1:1)");
        eprintln!("  output_path:  where to write the image (default out.png)");
        eprintln!();
        eprintln!("Requires GEMINI_API_KEY in the environment.");
        std::process::exit(1);
    }

    let prompt = args[1].clone();
    let aspect_ratio = match args.get(2) {
        Some(raw) => AspectRatio::parse(raw).ok_or_else(|| format!("unknown aspect ratio: {}", raw))?,
        None => AspectRatio::default(),
    };
    let output_path = args.get(3).cloned().unwrap_or_else(|| "out.png".to_string());

    let api_key = env::var("GEMINI_API_KEY").map_err(|_| "GEMINI_API_KEY is not set")?;
    let config = StudioConfig::load_or_default();
    let client = Arc::new(GeminiClient::from_config(&api_key, &config)?);
    let backend = Arc::new(FileStorage::open_default()?);

    let mut studio = Studio::new(client, backend, &config);
    studio.session.handle(SessionEvent::SetPrompt(prompt))?;
    studio
        .session
        .handle(SessionEvent::SetAspectRatio(aspect_ratio))?;

    println!("Generating...");
    studio.submit().await?;

    if let Some(err) = studio.session.error_state() {
        eprintln!("Generation failed: {}", err.user_message());
        std::process::exit(1);
    }

    let result = studio
        .session
        .current_result()
        .ok_or("generation settled without a result")?;
    let image = result.image.as_ref().ok_or("result carries no image")?;
    let bytes = encoding::decode(image)?;
    fs::write(&output_path, &bytes)?;

    if let Some(ref narrative) = result.narrative_text {
        println!("Model note: {}", narrative);
    }
    println!(
        "Wrote {} ({} bytes, {}); gallery now holds {} entries",
        output_path,
        bytes.len(),
        image.mime_type,
        studio.gallery().len()
    );

    Ok(())
}
