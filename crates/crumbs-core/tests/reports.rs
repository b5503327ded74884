//! Report summaries built from scripted model responses.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crumbs_core::fakes::ScriptedClient;
use crumbs_core::{
    AnalysisEngine, AnalysisReport, AnalyzerKind, ChangeCategory, Commit, EngineConfig, Grade,
    Impact,
};

fn commit(sha: &str, message: &str) -> Commit {
    Commit::from_message(sha, message, "dev", "dev@example.com", Utc::now())
}

#[tokio::test]
async fn test_changelog_suggests_major_bump_for_breaking_commit() {
    let commits = vec![
        commit("a1b2c3d4e5f6", "feat: add csv export"),
        commit("b2c3d4e5f6a1", "fix: crash on empty repository"),
        commit("c3d4e5f6a1b2", "feat!: drop the v1 api"),
    ];
    let reply = json!([
        {"sha": "a1b2c3d4", "category": "feature", "description": "CSV export"},
        {"sha": "b2c3d4e5", "type": "fix", "description": "No crash on empty repositories"},
        {"sha": "c3d4e5f6", "section": "removed", "summary": "The v1 API is gone"}
    ]);
    let client = Arc::new(ScriptedClient::new().otherwise(reply.to_string()));
    let engine = AnalysisEngine::new(client, EngineConfig::available("test/model")).unwrap();

    let report = engine.analyze_changelog(&commits).await.unwrap();

    assert_eq!(report.entries().len(), 3);
    assert_eq!(report.entries()[0].impact, Impact::Minor);
    assert_eq!(report.entries()[1].impact, Impact::Patch);
    assert!(report.entries()[2].breaking);
    assert_eq!(report.breaking_count(), 1);
    assert_eq!(report.suggested_bump(), Some(Impact::Major));
    assert_eq!(report.category_count(ChangeCategory::Added), 1);
    assert_eq!(
        report.overview(),
        "3 changes: 1 added, 1 fixed, 1 removed; 1 breaking. Suggested bump: major."
    );
}

#[tokio::test]
async fn test_quality_report_grades_the_average() {
    let commits = vec![
        commit("0a0a0a0a0a0a", "feat(parser): support nested tables"),
        commit("1b1b1b1b1b1b", "wip"),
    ];
    let reply = json!([
        {"sha": "0a0a0a0a", "overall_score": 9.5, "clarity": 9, "specificity": 10, "issues": []},
        {
            "sha": "1b1b1b1b",
            "score": "6",
            "problems": ["vague subject", "no body"],
            "improvement": "Say what changed"
        }
    ]);
    let client = Arc::new(ScriptedClient::new().otherwise(reply.to_string()));
    let engine = AnalysisEngine::new(client, EngineConfig::available("test/model")).unwrap();

    let report = engine.analyze_quality(&commits).await.unwrap();

    assert_eq!(report.scores().len(), 2);
    assert!((report.average_score() - 7.75).abs() < 1e-9);
    assert_eq!(report.grade(), Some(Grade::C));
    assert_eq!(report.lowest()[0].sha, "1b1b1b1b1b1b");
    assert_eq!(report.top_issues()[0], ("vague subject".to_string(), 1));
}

#[tokio::test]
async fn test_analyze_all_runs_each_kind_once() {
    let commits = vec![commit("feedfacecafe", "chore: bump deps")];
    let client = Arc::new(ScriptedClient::new().otherwise("[]"));
    let engine = AnalysisEngine::new(client.clone(), EngineConfig::available("test/model")).unwrap();

    let reports = engine
        .analyze_all(&commits, &AnalyzerKind::ALL)
        .await
        .unwrap();

    let kinds: Vec<AnalyzerKind> = reports.iter().map(AnalysisReport::kind).collect();
    assert_eq!(kinds, AnalyzerKind::ALL.to_vec());
    assert_eq!(client.call_count(), 5);
    for report in &reports {
        assert!(report.is_empty());
        assert_eq!(report.stats().batches_total, 1);
        assert_eq!(report.stats().batches_failed, 0);
    }
}
