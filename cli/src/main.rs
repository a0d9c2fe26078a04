//! BodyCode CLI - binary entry point.
//!
//! `bodycode analyze` validates a health report image, streams the analysis and
//! then keeps a follow-up chat open on stdin. `bodycode check` scores a
//! supplement against the ones already taken.

mod render;

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
    process::ExitCode,
    sync::Mutex,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use bodycode_engine::{
    AdditionalInfo, AnalysisError, App, BodycodeConfig, BowelRegularity, DoseTime, SleepQuality,
    StreamUpdate, StressLevel, Transport, TurnOutcome, load_image,
};

#[derive(Debug, Parser)]
#[command(name = "bodycode", version, about = "Gut-brain axis health report analysis")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyse an InBody or checkup result image, then chat about it.
    Analyze(AnalyzeArgs),
    /// Score a supplement image against what you already take.
    Check(CheckArgs),
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    /// Health report image (png, jpg, webp, gif, heic).
    image: PathBuf,
    /// 낮음 | 보통 | 높음
    #[arg(long, default_value_t = StressLevel::default())]
    stress: StressLevel,
    /// 좋음 | 보통 | 나쁨
    #[arg(long, default_value_t = SleepQuality::default())]
    sleep: SleepQuality,
    /// 규칙적 | 불규칙적
    #[arg(long, default_value_t = BowelRegularity::default())]
    bowel: BowelRegularity,
    /// Medications, conditions or goals.
    #[arg(long, default_value = "")]
    notes: String,
}

#[derive(Debug, Parser)]
struct CheckArgs {
    /// Supplement product image.
    image: PathBuf,
    /// Supplements you currently take, free text.
    #[arg(long, default_value = "")]
    current: String,
}

const HELP: &str = "\
후속 질문을 입력하세요. 명령어:
  /remind <영양제> <morning|lunch|evening>  복용 시간 토글
  /reminders                               알림 계획 보기
  /save                                    알림 저장
  /reset                                   대화 초기화 후 종료
  /quit                                    종료";

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // Analysis text goes to stdout; no log file means no logs.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.bodycode/logs/bodycode.log
    if let Some(config_path) = BodycodeConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("bodycode.log"));
    }

    candidates.push(PathBuf::from(".bodycode").join("logs").join("bodycode.log"));

    candidates
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing();

    let config = match BodycodeConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("설정 파일을 읽지 못해 기본값을 사용합니다: {e}");
            None
        }
    };
    let mut app = App::from_config(config.as_ref());
    if let Some(reason) = app.disabled_reason() {
        tracing::error!(%reason, "Analysis is disabled");
        eprintln!("{}", reason.user_message());
        return Ok(ExitCode::FAILURE);
    }

    match cli.command {
        Command::Analyze(args) => analyze(&mut app, args).await,
        Command::Check(args) => check(&mut app, args).await,
    }
}

fn report(error: &AnalysisError) {
    eprintln!("{}", error.user_message());
    if error.is_auth_failure() {
        eprintln!("API 키가 거부되었습니다. GEMINI_API_KEY 또는 ~/.bodycode/config.toml을 확인해주세요.");
    }
}

async fn check<T: Transport>(app: &mut App<T>, args: CheckArgs) -> Result<ExitCode> {
    let image = load_image(&args.image).await?;
    eprintln!("성분 궁합을 분석하는 중...");
    match app.check_compatibility(Some(image), &args.current).await {
        Ok(result) => {
            print!("{}", render::compatibility(&result));
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            report(&e);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn analyze<T: Transport>(app: &mut App<T>, args: AnalyzeArgs) -> Result<ExitCode> {
    let image = load_image(&args.image).await?;
    app.set_image(image);
    app.set_additional_info(AdditionalInfo {
        stress: args.stress,
        sleep: args.sleep,
        bowel: args.bowel,
        notes: args.notes,
    });

    eprintln!("건강 데이터 문서인지 확인하는 중...");
    if let Err(e) = app.start_analysis().await {
        report(&e);
        return Ok(ExitCode::FAILURE);
    }

    let mut received = 0usize;
    let outcome = loop {
        match app.next_stream_update().await {
            Some(StreamUpdate::Delta(text)) => {
                received += text.chars().count();
                eprint!("\r분석 중... {received}자");
            }
            Some(StreamUpdate::Finished(outcome)) => break Some(outcome),
            None => break None,
        }
    };
    eprintln!();
    if let Some(usage) = app.last_usage() {
        eprintln!(
            "토큰 사용량: 입력 {} / 출력 {}",
            usage.input_tokens, usage.output_tokens
        );
    }

    match outcome {
        Some(TurnOutcome::AnalysisCompleted) => {}
        Some(TurnOutcome::AnalysisFailed(e)) => {
            report(&e);
            return Ok(ExitCode::FAILURE);
        }
        other => {
            tracing::warn!(?other, "Unexpected end of analysis stream");
            return Ok(ExitCode::FAILURE);
        }
    }

    let raw = app.turns().get(1).map(|turn| turn.text.clone()).unwrap_or_default();
    if let Some(document) = app.analysis() {
        print!("\n{}", render::analysis(&raw, &document));
    }

    chat(app).await?;
    Ok(ExitCode::SUCCESS)
}

async fn chat<T: Transport>(app: &mut App<T>) -> Result<()> {
    println!("\n{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        let line = line.trim();

        match line.split_once(' ').map_or((line, ""), |(cmd, rest)| (cmd, rest.trim())) {
            ("", _) => {}
            ("/quit" | "/exit", _) => return Ok(()),
            ("/reset", _) => {
                app.reset();
                println!("대화를 초기화했습니다. 새 분석은 bodycode analyze로 시작하세요.");
                return Ok(());
            }
            ("/reminders", _) => print!("{}", render::reminders(app.reminders())),
            ("/save", _) => {
                app.reminders_mut().save();
                println!("알림이 저장되었습니다!");
            }
            ("/remind", args) => remind(app, args),
            _ => follow_up(app, line).await?,
        }
    }
}

fn remind<T: Transport>(app: &mut App<T>, args: &str) {
    let Some((item, time)) = args.rsplit_once(' ') else {
        println!("사용법: /remind <영양제> <morning|lunch|evening>");
        return;
    };
    let time = match time.parse::<DoseTime>() {
        Ok(time) => time,
        Err(e) => {
            println!("{e}");
            return;
        }
    };
    if app.reminders_mut().toggle(item.trim(), time) {
        print!("{}", render::reminders(app.reminders()));
    } else {
        println!("추천 목록에 없는 영양제입니다: {}", item.trim());
    }
}

async fn follow_up<T: Transport>(app: &mut App<T>, question: &str) -> Result<()> {
    if let Err(e) = app.send_follow_up(question) {
        println!("{}", e.user_message());
        return Ok(());
    }

    let mut stdout = std::io::stdout();
    while let Some(update) = app.next_stream_update().await {
        match update {
            StreamUpdate::Delta(text) => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            StreamUpdate::Finished(TurnOutcome::ReplyFailed(e)) => {
                tracing::debug!("Follow-up reply failed: {e}");
                if let Some(turn) = app.turns().last() {
                    writeln!(stdout, "\n{}", turn.text)?;
                }
            }
            StreamUpdate::Finished(_) => writeln!(stdout)?,
        }
    }
    Ok(())
}
