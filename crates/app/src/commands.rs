use annales_core::ChaptersState;
use annales_core::model::{ChapterCatalog, ChapterId, Session, SessionKind};
use chrono::DateTime;
use services::{Alert, AppServices};

use crate::args::{ChapterArgs, Command};

type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Alerts go straight to the terminal.
pub struct StderrAlert;

impl Alert for StderrAlert {
    fn alert(&self, message: &str) {
        tracing::error!(alert = true, "{message}");
        eprintln!("!! {message}");
    }
}

/// Resolves raw chapter ids against `catalog`. A bank shipped without a
/// chapter list accepts any numeric id.
pub fn chapters_state(
    catalog: &ChapterCatalog,
    args: &ChapterArgs,
) -> Result<ChaptersState, annales_core::Error> {
    let selected = args
        .chapters
        .iter()
        .map(|raw| {
            if catalog.for_subject(args.subject).next().is_none() {
                raw.parse::<ChapterId>()
            } else {
                catalog.parse_chapter_id(raw)
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ChaptersState {
        only_new: args.only_new,
        selected,
        include_rest: args.include_rest,
    })
}

pub async fn run_command(
    app: AppServices,
    catalog: &ChapterCatalog,
    command: Command,
) -> CommandResult {
    match command {
        Command::Status => status(&app),
        Command::Select(args) => {
            let state = chapters_state(catalog, &args)?;
            let selection = app.study().select(args.subject, &state);
            for (chapter, qids) in &selection.by_chapter {
                let name = catalog.get(*chapter).map_or("", |c| c.name.as_str());
                println!("chapter {chapter} {name}: {} question(s)", qids.len());
            }
            if args.include_rest {
                println!("no chapter: {} question(s)", selection.rest.len());
            }
            let list = selection.to_list();
            for qid in &list {
                println!("{qid}");
            }
            println!("{} question(s) selected", list.len());
        }
        Command::Start {
            name,
            kind,
            chapters,
        } => {
            let state = chapters_state(catalog, &chapters)?;
            let id = app.study().start(name, kind, chapters.subject, &state)?;
            let count = app.sessions().current().map_or(0, |s| s.questions.len());
            println!("started {id} with {count} question(s)");
        }
        Command::Answer {
            qid,
            choice,
            elapsed_s,
        } => {
            let sessions = app.sessions();
            sessions.tick(Some(&qid), elapsed_s)?;
            sessions.select_choice(&qid, choice)?;
            match app.study().submit_answer(&qid)? {
                Some(attempt) => {
                    let reveal = sessions.current().is_some_and(|s| s.reveal_immediately);
                    if reveal {
                        let verdict = if attempt.correct { "correct" } else { "incorrect" };
                        let answer = app.bank().get(&qid).map_or(0, |q| q.answer);
                        println!("{qid}: {verdict} (answer {answer})");
                    } else {
                        println!("{qid}: answer recorded");
                    }
                }
                None => println!("{qid}: nothing recorded"),
            }
        }
        Command::Save => match app.sessions().save()? {
            Some(session) => println!("saved {}", describe(&session)),
            None => println!("no ongoing session"),
        },
        Command::Cancel => {
            app.sessions().cancel()?;
            println!("session cancelled");
        }
        Command::History => {
            let sessions = app.history().list();
            if sessions.is_empty() {
                println!("no finished session");
            }
            for session in &sessions {
                println!("{}", describe(session));
            }
        }
        Command::Reset => {
            app.reset().await?;
            println!("local data erased");
            return Ok(());
        }
    }
    app.flush().await?;
    Ok(())
}

fn status(app: &AppServices) {
    let sessions = app.sessions();
    match sessions.current() {
        Some(session) => {
            println!(
                "ongoing: {} \"{}\" ({}) {}/{} answered, {}s elapsed",
                session.id,
                session.name,
                kind_label(session.kind),
                session.answered_count(),
                session.questions.len(),
                sessions.duration(),
            );
            if let Some(left) = sessions.remaining_time() {
                println!("time left: {left}s");
            }
        }
        None => println!("no ongoing session"),
    }
    println!("finished sessions: {}", app.history().len());
    println!("questions attempted: {}", app.attempts().question_count());
    println!("questions in bank: {}", app.bank().len());
}

fn kind_label(kind: SessionKind) -> String {
    match kind {
        SessionKind::Exam { year, .. } => format!("exam {year}"),
        SessionKind::Practice => "practice".to_owned(),
    }
}

fn describe(session: &Session) -> String {
    let when = DateTime::from_timestamp_millis(session.created_at)
        .map_or_else(|| session.created_at.to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
    format!(
        "{} {when} \"{}\" ({}) {} question(s) in {}s",
        session.id,
        session.name,
        kind_label(session.kind),
        session.questions.len(),
        session.duration_s,
    )
}
