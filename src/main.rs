use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use papo::voice::{
    AudioCapture, AudioPlayback, CloudSynthesizer, MicrophoneRecognizer, PLAYBACK_SAMPLE_RATE,
    TextToSpeech, rms,
};
use papo::{Assistant, Config, Status};

/// Papo - talk to a language model and hear it answer
#[derive(Parser)]
#[command(name = "papo", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Send one message, print the streamed reply and speak it
    Ask {
        /// Message to send
        text: String,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Olá, Senhor! Este é um teste de síntese de voz.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,papo=info",
        1 => "info,papo=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load();
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Some(Command::Ask { text }) => ask(&config, &text).await,
        Some(Command::TestMic { duration }) => test_mic(duration).await,
        Some(Command::TestSpeaker) => test_speaker().await,
        Some(Command::TestTts { text }) => test_tts(&config, &text).await,
        None => interactive(&config).await,
    }
}

fn build_assistant(config: &Config) -> anyhow::Result<Assistant> {
    let recognition = Arc::new(MicrophoneRecognizer::new(config)?);
    let synthesis = Arc::new(CloudSynthesizer::new(config)?);
    let assistant = Assistant::new(config, recognition, synthesis);

    if !assistant.state().is_ready() {
        tracing::warn!("chat unavailable - set GEMINI_API_KEY to talk to the model");
    }

    tokio::spawn(log_status(assistant.state().subscribe()));
    Ok(assistant)
}

/// Log every status change
async fn log_status(mut rx: watch::Receiver<Status>) {
    while rx.changed().await.is_ok() {
        let status = *rx.borrow_and_update();
        tracing::debug!(
            ready = status.ready,
            listening = status.listening,
            speaking = status.speaking,
            "status changed"
        );
    }
}

/// Stream one reply to stdout while it is spoken
async fn converse(assistant: &Assistant, message: &str) {
    let result = assistant
        .converse(message, |fragment| {
            print!("{fragment}");
            std::io::stdout().flush().ok();
        })
        .await;
    println!();

    if let Err(e) = result {
        tracing::error!(error = %e, "chat failed");
    }
}

/// Interactive loop: Enter listens, a typed line is sent as text
///
/// Replies run as their own task so `/stop` and Ctrl-C stay responsive
/// while one is streaming.
async fn interactive(config: &Config) -> anyhow::Result<()> {
    let assistant = Arc::new(build_assistant(config)?);
    let (tx, mut transcripts) = mpsc::unbounded_channel();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut reply: Option<JoinHandle<()>> = None;

    println!("Enter: listen | text: send | /stop: silence | /quit: exit");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "" => assistant.listen(tx.clone()),
                    "/stop" => silence(&assistant, reply.take()),
                    "/quit" => break,
                    text => reply = Some(respond(&assistant, reply.take(), text.to_string())),
                }
            }
            Some(transcript) = transcripts.recv() => {
                println!("> {transcript}");
                reply = Some(respond(&assistant, reply.take(), transcript));
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                break;
            }
        }
    }

    silence(&assistant, reply);
    Ok(())
}

/// Start a reply task, dropping any reply still in progress
fn respond(
    assistant: &Arc<Assistant>,
    previous: Option<JoinHandle<()>>,
    message: String,
) -> JoinHandle<()> {
    silence(assistant, previous);
    let assistant = Arc::clone(assistant);
    tokio::spawn(async move { converse(&assistant, &message).await })
}

/// Abort the streaming reply and stop listening and speaking
fn silence(assistant: &Assistant, reply: Option<JoinHandle<()>>) {
    if let Some(reply) = reply {
        reply.abort();
    }
    assistant.recognizer().stop();
    assistant.speech().cancel();
}

/// Send one message and wait until it has been spoken
async fn ask(config: &Config, text: &str) -> anyhow::Result<()> {
    let assistant = build_assistant(config)?;
    let mut status = assistant.state().subscribe();

    assistant
        .converse(text, |fragment| {
            print!("{fragment}");
            std::io::stdout().flush().ok();
        })
        .await?;
    println!();

    status.wait_for(|s| !s.speaking).await?;
    Ok(())
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]", i + 1);
    }

    capture.stop();

    println!("\nIf RMS stayed near 0, check that your mic is plugged in and unmuted.");
    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("You should hear a 440Hz tone for 2 seconds\n");

    #[allow(clippy::cast_precision_loss)]
    let sample_rate = PLAYBACK_SAMPLE_RATE as f32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let num_samples = (sample_rate * 2.0) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate).sin() * 0.3)
        .collect();

    let outcome = tokio::task::spawn_blocking(move || {
        AudioPlayback::new()?.play(samples, &AtomicBool::new(false))
    })
    .await??;

    println!("Playback {outcome:?}");
    Ok(())
}

/// Test TTS output
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let key = config
        .api_keys
        .openai
        .clone()
        .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY not set"))?;
    let tts = TextToSpeech::new_openai(
        key,
        config.voice.tts_voice.clone(),
        config.voice.tts_model.clone(),
    )?;

    let mp3_data = tts.synthesize(text, config.voice.tts_speed).await?;
    println!("Got {} bytes of audio data", mp3_data.len());

    tokio::task::spawn_blocking(move || {
        AudioPlayback::new()?.play_mp3(&mp3_data, &AtomicBool::new(false))
    })
    .await??;

    println!("If you heard the speech, TTS is working!");
    Ok(())
}
