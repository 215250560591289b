//! Chunkdrop command-line uploader.
//!
//! Hashes a file, asks the server which chunks it already holds, uploads the
//! rest and requests the merge. Re-running after an interruption resumes.

use std::path::PathBuf;

use chunkdrop_client::{ClientConfig, UploadCoordinator, UploadEvent};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Resumable chunked file upload", long_about = None)]
struct Cli {
    /// File to upload
    file: PathBuf,

    /// Base URL of the upload server
    #[arg(long, short = 'e')]
    endpoint: Option<String>,

    /// Chunk size in bytes
    #[arg(long)]
    chunk_size: Option<u64>,

    /// Chunk uploads in flight at once
    #[arg(long, short = 'j')]
    concurrency: Option<usize>,
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        let defaults = ClientConfig::default();
        ClientConfig {
            endpoint: self.endpoint.clone().unwrap_or(defaults.endpoint),
            chunk_size: self.chunk_size.unwrap_or(defaults.chunk_size),
            concurrency: self.concurrency.unwrap_or(defaults.concurrency).max(1),
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    if cli.chunk_size == Some(0) {
        anyhow::bail!("--chunk-size must be greater than zero");
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.client_config();
    tracing::debug!(endpoint = %config.endpoint, chunk_size = config.chunk_size, "uploading");

    let mut coordinator = UploadCoordinator::http(config)?;
    let cancel = coordinator.cancel_token();

    let printer = coordinator.take_events().map(|mut events| {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                print_event(&event);
            }
        })
    });

    let result = {
        let upload = coordinator.upload_file(&cli.file);
        tokio::pin!(upload);

        tokio::select! {
            result = &mut upload => result,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\ninterrupted, cancelling (re-run to resume)");
                cancel.cancel();
                upload.await
            }
        }
    };

    // Closes the event channel so the printer drains and exits.
    drop(coordinator);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    let summary = result?;
    if summary.already_complete {
        println!("{} already on server ({})", cli.file.display(), summary.file_hash);
    } else {
        println!(
            "uploaded {} ({} bytes, {} chunks, {} sent, {} resumed) as {}",
            cli.file.display(),
            summary.file_size,
            summary.chunks,
            summary.uploaded,
            summary.skipped,
            summary.file_hash
        );
    }
    Ok(())
}

fn print_event(event: &UploadEvent) {
    match event {
        UploadEvent::HashProgress { processed, total } => {
            eprint!("\rhashing {processed}/{total}");
        }
        UploadEvent::HashCompleted { file_hash } => eprintln!("\rhash {file_hash}"),
        UploadEvent::Verified {
            should_upload: true,
            already_stored,
        } if *already_stored > 0 => {
            eprintln!("resuming, {already_stored} chunk(s) already on server");
        }
        UploadEvent::Progress {
            fraction,
            bytes_per_second,
        } => {
            eprint!(
                "\r{:5.1}%  {:.1} MiB/s",
                fraction * 100.0,
                bytes_per_second / (1024.0 * 1024.0)
            );
        }
        UploadEvent::ChunkFailed { index, error } => {
            eprintln!("\nchunk {index} failed: {error}");
        }
        UploadEvent::Merged { .. } => eprintln!("\nmerged"),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_come_from_client_config() {
        let cli = Cli::parse_from(["chunkdrop-upload", "movie.mp4"]);
        assert_eq!(cli.file, PathBuf::from("movie.mp4"));
        assert_eq!(cli.client_config(), ClientConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "chunkdrop-upload",
            "a.bin",
            "--endpoint",
            "http://10.0.0.2:3000/",
            "--chunk-size",
            "1048576",
            "-j",
            "0",
        ]);
        let config = cli.client_config();
        assert_eq!(config.endpoint, "http://10.0.0.2:3000/");
        assert_eq!(config.chunk_size, 1_048_576);
        assert_eq!(config.concurrency, 1);
    }
}
