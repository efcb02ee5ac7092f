//! Concurrent writers against one file-backed database.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tempfile::TempDir;

use docqa::config::Config;
use docqa::context::AppContext;
use docqa::ingest::{create_session, ingest_text, sha256_hex};
use docqa::llm::DisabledModel;
use docqa::models::{IndexStatus, NewDocument, PaperRecord};
use docqa::papers::PaperSearch;
use docqa::{db, migrate};
use docqa_core::embedding::Embedder;

struct LengthEmbedder;

#[async_trait]
impl Embedder for LengthEmbedder {
    fn model_name(&self) -> &str {
        "length"
    }
    fn dims(&self) -> usize {
        2
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
    }
}

async fn file_backed_context(tmp: &TempDir) -> AppContext {
    let config: Config = toml::from_str(&format!(
        r#"[db]
path = "{root}/data/docqa.sqlite"

[storage]
upload_dir = "{root}/uploads"

[server]
bind = "127.0.0.1:0"
"#,
        root = tmp.path().display()
    ))
    .unwrap();

    let pool = db::connect(&config).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    AppContext::new(
        config,
        pool,
        Arc::new(LengthEmbedder),
        Arc::new(DisabledModel),
        PaperSearch::new(Vec::new()),
    )
}

fn new_doc(name: &str) -> NewDocument {
    NewDocument {
        filename: name.to_string(),
        file_size: 1,
        topic_id: None,
        sha256: sha256_hex(name.as_bytes()),
    }
}

fn paper(title: &str) -> PaperRecord {
    PaperRecord {
        title: title.to_string(),
        authors: "A. Author".to_string(),
        abstract_text: "Abstract...".to_string(),
        year: 2020,
        citations: 1,
        views: 0,
        pdf_link: None,
        publisher_link: None,
        source: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_sessions_uploads_and_saves() {
    let tmp = TempDir::new().unwrap();
    let ctx = file_backed_context(&tmp).await;

    let mut seed = Vec::new();
    for i in 0..3 {
        let name = format!("seed{}.pdf", i);
        let doc = ingest_text(&ctx, new_doc(&name), "seed text for sessions")
            .await
            .unwrap();
        seed.push(doc.id);
    }

    let mut sessions = Vec::new();
    let mut uploads = Vec::new();
    let mut saves = Vec::new();
    for i in 0..20 {
        let c = ctx.clone();
        let ids = seed.clone();
        sessions.push(tokio::spawn(async move {
            create_session(&c, &format!("session {}", i), &ids).await
        }));

        let c = ctx.clone();
        uploads.push(tokio::spawn(async move {
            let name = format!("upload{}.pdf", i);
            ingest_text(&c, new_doc(&name), &"words and more words ".repeat(80)).await
        }));

        let c = ctx.clone();
        saves.push(tokio::spawn(async move {
            c.registry
                .save_paper(&paper(&format!("Paper {}", i % 5)), "Concurrency")
                .await
        }));
    }

    for handle in sessions {
        let session = handle.await.unwrap().expect("session creation failed");
        assert_eq!(session.index_status, IndexStatus::Indexed);
        assert_eq!(session.document_count, 3);
    }
    for handle in uploads {
        let doc = handle.await.unwrap().expect("upload failed");
        assert_eq!(doc.index_status, IndexStatus::Indexed);
    }
    let mut created = 0;
    for handle in saves {
        if handle.await.unwrap().expect("paper save failed").created {
            created += 1;
        }
    }

    assert_eq!(created, 5);
    assert_eq!(ctx.registry.list_sessions().await.unwrap().len(), 20);
    assert_eq!(ctx.registry.list_documents(None).await.unwrap().len(), 23);
    let topics = ctx.registry.list_topics().await.unwrap();
    assert_eq!(topics.len(), 1);
    assert_eq!(topics[0].paper_count, 5);
}
