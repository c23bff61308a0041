use logpipe::{
    config::AppConfig,
    pipeline::{
        create_pipeline_channel, event::LogEvent, executor::FilterStage,
        registry::FilterRegistry, PipelineReceiver, PipelineSender,
    },
};
use std::io::BufRead;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let use_ansi = atty::is(atty::Stream::Stderr);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("logpipe={}", log_level).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(use_ansi),
        )
        .init();

    let config = AppConfig::from_env()?;
    let ctx = CancellationToken::new();

    let registry = FilterRegistry::with_builtin_filters();
    let stage = FilterStage::from_config(&registry, &ctx, &config.filter)?;

    let (input_tx, input_rx) = create_pipeline_channel(config.chan_size);
    let (output_tx, output_rx) = create_pipeline_channel(config.chan_size);

    // Not joined: a read blocked on an interactive terminal must not hold up
    // shutdown. The thread ends on EOF or once the stage closes its input.
    let reader_ctx = ctx.clone();
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || read_stdin(reader_ctx, input_tx))?;
    let writer = tokio::spawn(write_stdout(output_rx));
    let stage = stage.spawn(ctx.clone(), input_rx, output_tx);

    let shutdown = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
            shutdown.cancel();
        }
    });

    stage.await??;
    writer.await??;

    Ok(())
}

fn read_stdin(ctx: CancellationToken, input: PipelineSender) {
    for line in std::io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to read stdin: {}", e);
                break;
            }
        };

        if ctx.is_cancelled() {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        if input.blocking_send(LogEvent::from_line(&line)).is_err() {
            break;
        }
    }

    tracing::debug!("Stdin reader finished");
}

async fn write_stdout(mut output: PipelineReceiver) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();

    while let Some(event) = output.recv().await {
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');
        stdout.write_all(&line).await?;
    }

    stdout.flush().await?;
    Ok(())
}
