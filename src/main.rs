//! One-shot CLI around the locator: resolve a selector on a device and
//! print the result as JSON.
//!
//! Usage:
//!   tapscout [--device <serial>] [--resource-id <id>] [--class <name>]
//!            [--contains] [--near <text>] [--grid <cell> <position>]
//!            [--visual-fallback] [--base64] [--debug] [<query>]

use std::sync::Arc;

use tapscout::config::{self, AppConfig};
use tapscout::device::adb::AdbBridge;
use tapscout::locator::ocr::TesseractOcr;
use tapscout::{FindOptions, Locator, Selector};

fn usage() -> ! {
    eprintln!(
        "Usage: tapscout [--device <serial>] [--resource-id <id>] [--class <name>] \
         [--contains] [--near <text>] [--grid <cell> <position>] \
         [--visual-fallback] [--base64] [--debug] [<query>]"
    );
    std::process::exit(2);
}

struct CliArgs {
    device: Option<String>,
    selector: Selector,
    options: FindOptions,
}

fn parse_args(args: &[String]) -> CliArgs {
    let mut device = None;
    let mut selector = Selector::default();
    let mut options = FindOptions::default();
    let mut query: Option<String> = None;
    let mut contains = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--device" => device = Some(iter.next().unwrap_or_else(|| usage()).clone()),
            "--resource-id" => {
                selector.resource_id = Some(iter.next().unwrap_or_else(|| usage()).clone())
            }
            "--class" => {
                selector.class_name = Some(iter.next().unwrap_or_else(|| usage()).clone())
            }
            "--near" => selector.nearest_to = Some(iter.next().unwrap_or_else(|| usage()).clone()),
            "--contains" => contains = true,
            "--grid" => {
                let cell = iter.next().unwrap_or_else(|| usage());
                let position = iter.next().unwrap_or_else(|| usage());
                options.grid_cell = cell.parse().ok();
                options.grid_position = position.parse().ok();
                if options.grid_cell.is_none() || options.grid_position.is_none() {
                    usage();
                }
            }
            "--visual-fallback" => options.include_visual_fallback = true,
            "--base64" => options.include_base64 = true,
            "--debug" => options.debug = true,
            other if other.starts_with("--") => usage(),
            other => query = Some(other.to_string()),
        }
    }

    match (query, contains) {
        (Some(q), true) => selector.text_contains = Some(q),
        (Some(q), false) => selector.text = Some(q),
        (None, _) => {}
    }

    CliArgs { device, selector, options }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let config = config::load_config().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "no config loaded, using defaults");
        AppConfig::default()
    });

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_args(&args);

    let Some(device) = cli.device.or(config.device.default_device.clone()) else {
        eprintln!("error: no device serial; pass --device or set device.default_device in config.toml");
        std::process::exit(2);
    };

    let bridge = Arc::new(AdbBridge::new(&config.device));
    let ocr = Arc::new(TesseractOcr::new(&config.ocr));
    let locator = Locator::new(bridge, ocr, &config.locator);

    let outcome = locator.find(&device, &cli.selector, &cli.options).await;
    locator.shutdown().await;

    match outcome {
        Ok(result) => match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error: failed to serialize result: {e}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
