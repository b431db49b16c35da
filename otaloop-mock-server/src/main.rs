//! Mock update server for bench testing the otaloop firmware
//!
//! Usage: cargo run -p otaloop-mock-server -- --version v0.3.0
//! Then point the device at http://<host>:8080/version.txt and
//! http://<host>:8080/firmware.bin (or /latest, which redirects there).

use clap::Parser;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(about = "Serve a version string and firmware image to otaloop devices")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Version string served at /version.txt
    #[arg(long = "version", default_value = "0.0.0-mock")]
    firmware_version: String,

    /// Firmware image to serve; a generated pattern is used if omitted
    #[arg(long)]
    firmware: Option<PathBuf>,

    /// Size of the generated pattern image in bytes
    #[arg(long, default_value_t = 102_400)]
    firmware_size: usize,

    /// Bytes per write while sending the image
    #[arg(long, default_value_t = 1024)]
    chunk_size: usize,

    /// Pause between image chunks, to exercise progress reporting
    #[arg(long, default_value_t = 0)]
    chunk_delay_ms: u64,

    /// Answer /version.txt with this status instead of 200
    #[arg(long)]
    fail_version: Option<u16>,

    /// Answer /firmware.bin with this status instead of 200
    #[arg(long)]
    fail_firmware: Option<u16>,

    /// Close the connection after sending this many image bytes
    #[arg(long)]
    truncate_at: Option<usize>,
}

struct Server {
    args: Args,
    image: Vec<u8>,
}

#[allow(clippy::cast_possible_truncation)]
fn pattern_image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

fn main() {
    let args = Args::parse();

    let image = match &args.firmware {
        Some(path) => match std::fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                eprintln!("Failed to read {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => pattern_image(args.firmware_size),
    };

    println!(
        "Mock update server starting on {} (version {:?}, image {} bytes)...",
        args.bind,
        args.firmware_version,
        image.len()
    );
    let listener = TcpListener::bind(&args.bind).unwrap_or_else(|e| {
        eprintln!("Failed to bind {}: {e}", args.bind);
        std::process::exit(1);
    });
    println!("Mock update server ready - waiting for connections...");

    let server = Arc::new(Server { args, image });
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                println!("Client connected: {:?}", stream.peer_addr());
                let server = server.clone();
                std::thread::spawn(move || {
                    if let Err(e) = handle_client(&server, stream) {
                        eprintln!("Client error: {e}");
                    }
                });
            }
            Err(e) => eprintln!("Connection error: {e}"),
        }
    }
}

/// Parse the request line, skip headers, return the path of a GET request
fn read_request(stream: &TcpStream) -> std::io::Result<Option<String>> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;

    loop {
        let mut header = String::new();
        if reader.read_line(&mut header)? == 0 || header.trim().is_empty() {
            break;
        }
    }

    let mut parts = request_line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(path)) => Ok(Some(path.to_string())),
        _ => Ok(None),
    }
}

fn write_head(
    stream: &mut TcpStream,
    status: u16,
    reason: &str,
    headers: &[(&str, String)],
) -> std::io::Result<()> {
    let mut head = format!("HTTP/1.1 {status} {reason}\r\nConnection: close\r\n");
    for (name, value) in headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");
    stream.write_all(head.as_bytes())
}

fn write_status(stream: &mut TcpStream, status: u16) -> std::io::Result<()> {
    let body = format!("status {status}\n");
    write_head(
        stream,
        status,
        "Mock",
        &[("Content-Length", body.len().to_string())],
    )?;
    stream.write_all(body.as_bytes())
}

fn handle_client(server: &Server, mut stream: TcpStream) -> std::io::Result<()> {
    let Some(path) = read_request(&stream)? else {
        println!("RX: unsupported request");
        return write_status(&mut stream, 405);
    };
    println!("RX: GET {path}");

    match path.as_str() {
        "/version.txt" => {
            if let Some(status) = server.args.fail_version {
                println!("TX: {status} (forced)");
                return write_status(&mut stream, status);
            }
            let body = format!("{}\n", server.args.firmware_version);
            println!("TX: 200 version {:?}", server.args.firmware_version);
            write_head(
                &mut stream,
                200,
                "OK",
                &[
                    ("Content-Type", "text/plain".to_string()),
                    ("Content-Length", body.len().to_string()),
                ],
            )?;
            stream.write_all(body.as_bytes())
        }
        "/latest" => {
            println!("TX: 302 -> /firmware.bin");
            write_head(
                &mut stream,
                302,
                "Found",
                &[
                    ("Location", "/firmware.bin".to_string()),
                    ("Content-Length", "0".to_string()),
                ],
            )
        }
        "/firmware.bin" => {
            if let Some(status) = server.args.fail_firmware {
                println!("TX: {status} (forced)");
                return write_status(&mut stream, status);
            }
            send_image(server, &mut stream)
        }
        _ => {
            println!("TX: 404");
            write_status(&mut stream, 404)
        }
    }
}

fn send_image(server: &Server, stream: &mut TcpStream) -> std::io::Result<()> {
    let image = &server.image;
    write_head(
        stream,
        200,
        "OK",
        &[
            ("Content-Type", "application/octet-stream".to_string()),
            ("Content-Length", image.len().to_string()),
        ],
    )?;

    let limit = server.args.truncate_at.unwrap_or(image.len()).min(image.len());
    let delay = Duration::from_millis(server.args.chunk_delay_ms);
    let start = Instant::now();

    for chunk in image[..limit].chunks(server.args.chunk_size.max(1)) {
        stream.write_all(chunk)?;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
    stream.flush()?;

    if limit < image.len() {
        println!("TX: image truncated at {limit} of {} bytes", image.len());
    } else {
        println!(
            "TX: image sent, {} bytes in {:.2} s",
            image.len(),
            start.elapsed().as_secs_f64()
        );
    }
    Ok(())
}
