//! CLI application for controlling a Wiz light.
//!
//! Run with: cargo run --example wiz_cli -- --ip 192.168.1.2 color red 60

use clap::{Parser, Subcommand};
use std::net::Ipv4Addr;
use wiz_light::{
    ClientConfig, Dimming, Light, LightProperties, PORT_SENTINEL, White, resolve_port,
};

const DEFAULT_BRIGHTNESS: u8 = 80;

/// Named colors as channel values: (r, g, b, c, w). `None` leaves the
/// channel at whatever the light already has.
type Channels = (Option<u8>, Option<u8>, Option<u8>, Option<u8>, Option<u8>);

const COLORS: &[(&str, Channels)] = &[
    ("white", (None, None, None, Some(0), Some(255))),
    ("warm", (None, None, None, Some(0), Some(255))),
    ("cold", (None, None, None, Some(255), Some(0))),
    ("red", (Some(255), Some(0), Some(0), None, None)),
    ("green", (Some(0), Some(255), Some(0), None, None)),
    ("blue", (Some(0), Some(0), Some(255), None, None)),
    ("yellow", (Some(255), Some(255), Some(0), None, None)),
    ("cyan", (Some(0), Some(255), Some(255), None, None)),
    ("magenta", (Some(255), Some(0), Some(255), None, None)),
    ("orange", (Some(255), Some(165), Some(0), None, None)),
    ("pink", (Some(255), Some(192), Some(203), None, None)),
    ("purple", (Some(128), Some(0), Some(128), None, None)),
];

#[derive(Parser)]
#[command(name = "wiz-cli")]
#[command(about = "Control a Wiz smart light from the command line", long_about = None)]
struct Cli {
    /// IP address of the Wiz light
    #[arg(short, long)]
    ip: Ipv4Addr,

    /// UDP port of the light (-1 for the default 38899)
    #[arg(short, long, default_value_t = PORT_SENTINEL, allow_negative_numbers = true)]
    port: i64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get the current status of the light
    Status,

    /// Turn the light on
    On,

    /// Turn the light off
    Off,

    /// Set a named color
    Color {
        /// One of: white, warm, cold, red, green, blue, yellow, cyan,
        /// magenta, orange, pink, purple
        name: String,
        /// Brightness level (0-100)
        #[arg(default_value_t = DEFAULT_BRIGHTNESS, value_parser = clap::value_parser!(u8).range(0..=100))]
        brightness: u8,
    },

    /// Get detailed diagnostics
    Diagnostics,
}

fn named_color(name: &str) -> Option<LightProperties> {
    let (_, (r, g, b, c, w)) = COLORS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))?;

    let mut props = LightProperties::new();
    if let Some(r) = r {
        props.set_red(*r);
    }
    if let Some(g) = g {
        props.set_green(*g);
    }
    if let Some(b) = b {
        props.set_blue(*b);
    }
    if let Some(c) = c {
        props.cool_white(&White::new(*c));
    }
    if let Some(w) = w {
        props.warm_white(&White::new(*w));
    }
    Some(props)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let ip = cli.ip;
    let port = resolve_port(cli.port)?;

    let light = Light::connect(ip, ClientConfig::default().with_port(port)).await?;

    match cli.command {
        Commands::Status => {
            println!("Getting status for light at {}:{}...", ip, port);
            match light.fetch_status().await {
                Ok(status) => {
                    let pilot = &status.result;
                    println!("\nLight Status:");
                    println!("  Power: {}", if pilot.state { "ON" } else { "OFF" });
                    println!("  MAC: {}", pilot.mac);
                    println!("  Signal: {} dBm", pilot.rssi);

                    if let (Some(r), Some(g), Some(b)) = (pilot.red, pilot.green, pilot.blue) {
                        println!("  Color: RGB({}, {}, {})", r, g, b);
                    }
                    if let (Some(c), Some(w)) = (pilot.cool, pilot.warm) {
                        println!("  White: cold {} / warm {}", c, w);
                    }
                    if let Some(dimming) = pilot.dimming {
                        println!("  Brightness: {}%", dimming);
                    }
                    if pilot.scene_id != 0 {
                        println!("  Scene: {}", pilot.scene_id);
                    }
                }
                Err(e) => eprintln!("Error getting status: {}", e),
            }
        }

        Commands::On => {
            println!("Turning light ON at {}...", ip);
            match light.turn_on().await {
                Ok(true) => println!("Light turned ON"),
                Ok(false) => println!("Light refused the command"),
                Err(e) => eprintln!("Error: {}", e),
            }
        }

        Commands::Off => {
            println!("Turning light OFF at {}...", ip);
            match light.turn_off().await {
                Ok(true) => println!("Light turned OFF"),
                Ok(false) => println!("Light refused the command"),
                Err(e) => eprintln!("Error: {}", e),
            }
        }

        Commands::Color { name, brightness } => {
            let Some(mut props) = named_color(&name) else {
                let names: Vec<&str> = COLORS.iter().map(|(n, _)| *n).collect();
                eprintln!("Unknown color '{}'. Available colors: {}", name, names.join(", "));
                light.shutdown();
                return Ok(());
            };
            let dimming = Dimming::create(brightness).ok_or("brightness must be 0-100")?;
            props.dimming(&dimming);

            println!(
                "Setting light at {} to {} at {}% brightness...",
                ip, name, brightness
            );
            match light.set_properties(&props).await {
                Ok(true) => println!("Color set successfully"),
                Ok(false) => println!("Failed to set color"),
                Err(e) => eprintln!("Error: {}", e),
            }
        }

        Commands::Diagnostics => {
            println!("Getting diagnostics for light at {}...", ip);
            if let Err(e) = light.refresh().await {
                eprintln!("Error refreshing status: {}", e);
            }
            let diag = light.diagnostics();
            println!("\nDiagnostics:\n{}", serde_json::to_string_pretty(&diag)?);
        }
    }

    light.shutdown();
    Ok(())
}
