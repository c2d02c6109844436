use std::sync::Arc;

use annales_core::model::{Qid, Question, QuestionBank, SessionKind, Subject};
use annales_core::Clock;
use services::{AppConfig, AppServices, LogAlert};

fn bank() -> QuestionBank {
    QuestionBank::new([Question {
        qid: Qid::new("q1"),
        year: 2019,
        subject: Subject::Navigation,
        no_subject: 3,
        no: 63,
        content: "Cap magnétique ?".into(),
        choices: ["a".into(), "b".into(), "c".into(), "d".into()],
        answer: 2,
        chapters: Vec::new(),
        attachment_link: None,
        mixed_choices: None,
    }])
    .unwrap()
}

fn config(dir: &std::path::Path) -> AppConfig {
    AppConfig {
        db_url: format!("sqlite://{}", dir.join("annales.sqlite3").display()),
        slots_dir: dir.join("slots"),
        key_prefix: "test".into(),
    }
}

async fn open(dir: &std::path::Path) -> AppServices {
    let app = AppServices::open(&config(dir), bank(), Clock::default(), Arc::new(LogAlert))
        .await
        .unwrap();
    app.wait_loaded().await.unwrap();
    app
}

#[tokio::test]
async fn attempts_survive_reopen_in_submission_order() {
    let dir = tempfile::tempdir().unwrap();
    let q1 = Qid::new("q1");
    let mut recorded = Vec::new();
    {
        let app = open(dir.path()).await;
        for choice in [0u8, 1, 2, 3, 2] {
            app.sessions()
                .create_session("retry", [q1.clone()], SessionKind::Practice)
                .unwrap();
            app.sessions().select_choice(&q1, choice).unwrap();
            recorded.push(app.study().submit_answer(&q1).unwrap().unwrap());
            app.sessions().save().unwrap();
        }
        app.flush().await.unwrap();
    }

    let app = open(dir.path()).await;
    assert_eq!(app.attempts().attempts_for(&q1), recorded);
    assert_eq!(app.history().len(), 5);
}

#[tokio::test]
async fn ongoing_session_is_restored_from_slots() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let app = open(dir.path()).await;
        let id = app
            .sessions()
            .create_session("exam", [Qid::new("q1")], SessionKind::Exam { year: 2019, time_budget_s: 600 })
            .unwrap();
        app.sessions().tick(None, 100).unwrap();
        id
    };

    let app = open(dir.path()).await;
    assert_eq!(app.sessions().current().map(|s| s.id), Some(id));
    assert_eq!(app.sessions().remaining_time(), Some(500));
}

#[tokio::test]
async fn reset_erases_everything() {
    let dir = tempfile::tempdir().unwrap();
    {
        let app = open(dir.path()).await;
        app.sessions()
            .create_session("s", [Qid::new("q1")], SessionKind::Practice)
            .unwrap();
        app.sessions().save().unwrap();
        app.sessions()
            .create_session("t", [Qid::new("q1")], SessionKind::Practice)
            .unwrap();
        app.reset().await.unwrap();
    }

    let app = open(dir.path()).await;
    assert!(app.history().is_empty());
    assert!(app.sessions().current().is_none());
}
