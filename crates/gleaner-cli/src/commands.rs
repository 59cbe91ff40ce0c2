//! Subcommand implementations: wire the engine to one page session and
//! dump the in-memory result as JSON. Formatting, export rendering, and
//! browser launch all stay outside this binary.

use std::path::{Path, PathBuf};

use gleaner_browser::{discover_targets, PageSession};
use gleaner_engine::{
    sample_region, CaptureLoop, CaptureOptions, CommandRecognizer, HarvestLoop, HarvestOptions,
    InjectOptions, Injector, NullRecognizer, Pacing, Payload, Recognizer,
};
use gleaner_types::{GleanConfig, Region, RunStatus};

/// Parse a region spec of the form "x,y,width,height".
pub fn parse_region(spec: &str) -> anyhow::Result<Region> {
    let parts: Vec<f64> = spec
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| anyhow::anyhow!("invalid region '{spec}': {e}"))?;
    match parts.as_slice() {
        [x, y, width, height] if *width > 0.0 && *height > 0.0 => Ok(Region {
            x: *x,
            y: *y,
            width: *width,
            height: *height,
        }),
        [_, _, _, _] => anyhow::bail!("invalid region '{spec}': width and height must be positive"),
        _ => anyhow::bail!("invalid region '{spec}': expected x,y,width,height"),
    }
}

async fn connect(config: &GleanConfig) -> anyhow::Result<PageSession> {
    let session = PageSession::connect(
        &config.endpoint.host,
        config.endpoint.port,
        config.endpoint.target_keyword.as_deref(),
    )
    .await?;
    Ok(session)
}

fn write_report<T: serde::Serialize>(output: &Path, report: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(output, json)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", output.display()))?;
    tracing::info!(path = %output.display(), "report written");
    Ok(())
}

/// Surface the run status to the operator and the exit code. Partial
/// success is its own outcome, never folded into success or failure.
fn finish(status: RunStatus) -> anyhow::Result<()> {
    match status {
        RunStatus::Complete => Ok(()),
        RunStatus::Partial { completed, failed } => {
            tracing::warn!(completed, failed, "run finished partially");
            Ok(())
        }
        RunStatus::Failed => anyhow::bail!("run failed: no cycle or item succeeded"),
    }
}

pub async fn targets(config: &GleanConfig) -> anyhow::Result<()> {
    let targets = discover_targets(&config.endpoint.host, config.endpoint.port).await?;
    if targets.is_empty() {
        anyhow::bail!(
            "no page targets on {}:{} -- is the browser running with remote debugging enabled?",
            config.endpoint.host,
            config.endpoint.port
        );
    }
    for target in &targets {
        let attachable = if target.web_socket_debugger_url.is_some() {
            ""
        } else {
            " (not attachable)"
        };
        println!("{}  {}{attachable}", target.title, target.url);
    }
    Ok(())
}

pub async fn harvest(config: &GleanConfig, output: &Path) -> anyhow::Result<()> {
    let session = connect(config).await?;

    let looper = HarvestLoop::new(&session, HarvestOptions::from_config(&config.harvest));

    // Ctrl-C stops the loop at the next cycle boundary instead of killing
    // the process mid-evaluation.
    let stop = looper.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping after the current cycle");
            stop.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });

    let harvest = looper.run().await?;

    println!(
        "extracted {} units over {} cycles",
        harvest.units.len(),
        harvest.cycles_run
    );
    write_report(output, &harvest)?;
    session.close().await;
    finish(harvest.status)
}

pub async fn capture(config: &GleanConfig, output: &Path) -> anyhow::Result<()> {
    let session = connect(config).await?;

    let region = match config.capture.region {
        Some(region) => region,
        None => sample_region(&session).await?,
    };

    let recognizer: Box<dyn Recognizer> = match &config.capture.recognizer_command {
        Some(command) => Box::new(
            CommandRecognizer::from_command_line(command)
                .ok_or_else(|| anyhow::anyhow!("empty recognizer command"))?,
        ),
        None => {
            tracing::warn!("no recognizer configured; recording screenshots only");
            Box::new(NullRecognizer)
        }
    };

    let looper = CaptureLoop::new(
        &session,
        &*recognizer,
        CaptureOptions::from_config(&config.capture),
    );
    let run = looper.run_cycles(&region).await?;

    println!(
        "{} captures, {} with new content; images in {}",
        run.captures.len(),
        run.new_content_cycles,
        config.capture.output_dir.display()
    );
    write_report(output, &run)?;
    session.close().await;
    finish(run.status)
}

pub async fn inject(
    config: &GleanConfig,
    files: Vec<PathBuf>,
    urls: Vec<String>,
    text: Option<String>,
    text_file: Option<PathBuf>,
    output: &Path,
) -> anyhow::Result<()> {
    let mut payloads: Vec<Payload> = files.into_iter().map(Payload::File).collect();
    if !urls.is_empty() {
        payloads.push(Payload::Urls(urls));
    }
    if let Some(text) = text {
        payloads.push(Payload::Text(text));
    }
    if let Some(path) = text_file {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        payloads.push(Payload::Text(content));
    }
    if payloads.is_empty() {
        anyhow::bail!("nothing to inject: pass --file, --url, --text, or --text-file");
    }

    let session = connect(config).await?;
    let book = config.selector_book();
    let injector = Injector::new(
        &session,
        &book,
        Pacing::default(),
        InjectOptions::from_config(&config.inject),
    );

    let report = injector.inject_batch(&payloads).await?;

    for item in &report.items {
        println!("{}: {:?}", item.label, item.outcome);
    }
    write_report(output, &report)?;
    session.close().await;
    finish(report.status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_region() {
        let region = parse_region("10, 20, 300, 450").unwrap();
        assert_eq!(region.x, 10.0);
        assert_eq!(region.y, 20.0);
        assert_eq!(region.width, 300.0);
        assert_eq!(region.height, 450.0);

        assert!(parse_region("10,20,300").is_err());
        assert!(parse_region("a,b,c,d").is_err());
        assert!(parse_region("0,0,-5,10").is_err());
    }
}
