use std::fmt;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use quiz_core::Position;
use quiz_core::model::{
    Answer, Question, QuestionId, QuestionType, QuizDefinition, Screen, SessionConfig,
};
use quiz_core::{Direction, Progress};
use services::{
    AjaxBackend, AjaxConfig, Clock, InMemoryBackend, NavControls, QuizBackend, QuizRunner,
    QuizView, RunnerError,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingQuiz,
    UnknownArg(String),
    UnknownCommand(String),
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingQuiz => write!(f, "play requires --quiz <file>"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  app play --quiz <file> [--offline] [--session-id <id>] [--settings <json>]");
    eprintln!();
    eprintln!("While playing:");
    eprintln!("  <answer>   answer the current question (option number or text;");
    eprintln!("             comma separated for multiple choice)");
    eprintln!("  <enter>    next / start");
    eprintln!("  :prev      previous question");
    eprintln!("  :submit    retry a failed submission");
    eprintln!("  :quit      abandon the quiz");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_AJAX_URL, QUIZ_AJAX_NONCE, QUIZ_ACTION_PREFIX, QUIZ_LOG");
}

struct PlayArgs {
    quiz: PathBuf,
    offline: bool,
    session_id: Option<String>,
    settings: String,
}

impl PlayArgs {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut quiz = None;
        let mut offline = false;
        let mut session_id = None;
        let mut settings = String::new();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--quiz" => quiz = Some(PathBuf::from(require_value(args, "--quiz")?)),
                "--offline" => offline = true,
                "--session-id" => session_id = Some(require_value(args, "--session-id")?),
                "--settings" => settings = require_value(args, "--settings")?,
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            quiz: quiz.ok_or(ArgsError::MissingQuiz)?,
            offline,
            session_id,
            settings,
        })
    }
}

//
// ─── TERMINAL VIEW ────────────────────────────────────────────────────────────
//

struct TerminalView;

impl QuizView for TerminalView {
    fn show_screen(&mut self, _index: usize, screen: &Screen, direction: Direction, controls: NavControls) {
        if direction == Direction::Reverse {
            println!("\n<< back");
        }
        match screen {
            Screen::Intro { title } => {
                println!("\n=== {title} ===");
                println!("Press enter to start.");
            }
            Screen::Question(question) => print_question(question, controls),
            Screen::ThankYou { message } => println!("\n{message}"),
        }
    }

    fn update_progress(&mut self, progress: Progress) {
        println!("[{}/{} {}%]", progress.current, progress.total, progress.percent);
    }

    fn show_validation_error(&mut self, _question_id: &QuestionId, message: &str, _duration: Duration) {
        println!("! {message}");
    }

    fn set_loading(&mut self, loading: bool) {
        if loading {
            println!("Submitting...");
        }
    }

    fn show_submission_error(&mut self, message: &str) {
        println!("! {message} (type :submit to retry)");
    }

    fn show_redirecting(&mut self) {
        println!("Redirecting...");
    }

    fn navigate_to(&mut self, url: &Url) {
        println!("-> {url}");
    }

    fn completed(&mut self) {
        println!("Done.");
    }
}

fn print_question(question: &Question, controls: NavControls) {
    let marker = if question.required { " *" } else { "" };
    let title = if question.title.is_empty() {
        question.id.as_str()
    } else {
        question.title.as_str()
    };
    println!("\n{title}{marker}");
    for (n, option) in question.options.iter().enumerate() {
        println!("  {}) {option}", n + 1);
    }

    let mut hints = Vec::new();
    if controls.show_previous {
        hints.push(":prev");
    }
    if controls.show_next {
        hints.push("<enter> next");
    }
    if !hints.is_empty() {
        println!("({})", hints.join(", "));
    }
}

/// Maps typed input onto an answer. Option numbers pick the option text.
fn parse_answer(question: &Question, input: &str) -> Answer {
    let pick = |raw: &str| -> String {
        raw.trim()
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|n| question.options.get(n))
            .cloned()
            .unwrap_or_else(|| raw.trim().to_owned())
    };

    match question.kind {
        QuestionType::MultipleChoice => Answer::multiple(
            input
                .split(',')
                .filter(|part| !part.trim().is_empty())
                .map(pick),
        ),
        QuestionType::Text | QuestionType::Email => Answer::single(input.trim()),
        QuestionType::SingleChoice | QuestionType::Rating | QuestionType::ImageChoice => {
            Answer::single(pick(input))
        }
    }
}

//
// ─── PLAY LOOP ────────────────────────────────────────────────────────────────
//

fn backend_for(offline: bool) -> Arc<dyn QuizBackend> {
    if offline {
        info!("playing offline");
        return Arc::new(InMemoryBackend::new());
    }
    match AjaxConfig::from_env() {
        Some(config) => {
            info!(endpoint = %config.endpoint, "playing against live endpoint");
            Arc::new(AjaxBackend::new(config))
        }
        None => {
            warn!("QUIZ_AJAX_URL not set; playing offline");
            Arc::new(InMemoryBackend::new())
        }
    }
}

async fn play(args: PlayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let document = std::fs::read_to_string(&args.quiz)?;
    let definition = QuizDefinition::from_json(&document)?;
    let config = SessionConfig::from_embedded(
        definition.form_id(),
        args.session_id.as_deref(),
        &args.settings,
    );
    info!(form_id = %config.form_id, session_id = %config.session_id, "starting quiz");

    let backend = backend_for(args.offline);
    let mut runner = QuizRunner::new(definition, config, backend, TerminalView, Clock::default())?;
    runner.initialize().await?;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    while !runner.state().position().is_terminal() {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next().transpose()? else {
            runner.abandon().await?;
            break;
        };

        if let Err(err) = step(&mut runner, line.trim()).await {
            eprintln!("{err}");
        }
    }

    runner.shutdown().await;
    Ok(())
}

async fn step(runner: &mut QuizRunner<TerminalView>, input: &str) -> Result<(), RunnerError> {
    match (runner.state().position(), input) {
        (_, ":quit") => runner.abandon().await,
        (_, ":prev") => runner.previous().await,
        (_, ":submit") => runner.submit().await,
        (Position::Intro, _) => runner.start().await,
        (_, "") => runner.next().await,
        _ => {
            let Some(question) = runner.state().current_question() else {
                return runner.next().await;
            };
            let id = question.id.clone();
            let answer = parse_answer(question, input);
            runner.answer(id, answer).await
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("QUIZ_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let mut argv = std::env::args().skip(1);
    let result: Result<PlayArgs, Box<dyn std::error::Error>> = match argv.next().as_deref() {
        Some("play") => PlayArgs::parse(&mut argv).map_err(Into::into),
        None | Some("--help" | "-h") => {
            print_usage();
            return;
        }
        Some(other) => Err(ArgsError::UnknownCommand(other.to_owned()).into()),
    };

    let outcome = match result {
        Ok(args) => play(args).await,
        Err(err) => {
            print_usage();
            Err(err)
        }
    };

    if let Err(err) = outcome {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> impl Iterator<Item = String> {
        raw.iter().map(|s| (*s).to_owned()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn play_args_require_quiz() {
        assert!(matches!(
            PlayArgs::parse(&mut args(&["--offline"])),
            Err(ArgsError::MissingQuiz)
        ));

        let parsed = PlayArgs::parse(&mut args(&["--quiz", "q.json", "--offline"])).unwrap();
        assert_eq!(parsed.quiz, PathBuf::from("q.json"));
        assert!(parsed.offline);
    }

    #[test]
    fn option_numbers_pick_option_text() {
        let question = Question::new("q", QuestionType::MultipleChoice).with_options(["red", "blue"]);
        assert_eq!(
            parse_answer(&question, "2, green"),
            Answer::multiple(["blue", "green"])
        );

        let single = Question::new("s", QuestionType::SingleChoice).with_options(["yes", "no"]);
        assert_eq!(parse_answer(&single, "1"), Answer::single("yes"));
        assert_eq!(parse_answer(&single, "9"), Answer::single("9"));
    }
}
