//! 链式执行端到端测试
//!
//! 数据集与引用表均从 JSON Lines 文件加载，工作流经 JSON 序列化后载入存储。

use crate::data::{
    ClaimSpec, ClaimsGenerator, WF_DIABETES_DRUG, WF_MIDDLE_AGED, WF_MULTI_DIAGNOSIS, WF_NOBODY,
    all_workflows, chain_of,
};
use crate::setup::TestEnvironment;
use rule_engine::{ChainExecutor, Row, RuleExecutor};

const PATIENTS: usize = 120;

fn expected(filter: impl Fn(&ClaimSpec) -> bool) -> Vec<(String, String)> {
    ClaimsGenerator::specs(PATIENTS)
        .into_iter()
        .filter(|s| filter(s))
        .map(|s| (s.patient_id(), s.code().to_string()))
        .collect()
}

fn keys(rows: &[Row]) -> Vec<(String, String)> {
    rows.iter()
        .map(|r| {
            (
                r.get("PatientId").unwrap_or_default().to_string(),
                r.get("Code").unwrap_or_default().to_string(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_three_step_chain_matches_oracle() {
    let env = TestEnvironment::new().unwrap();
    let source = env
        .open_source("claims.jsonl", &ClaimsGenerator::rows(PATIENTS))
        .unwrap();
    let tables = env
        .reference_tables(&[("diabetes-drugs", ClaimsGenerator::diabetes_drugs())])
        .unwrap();
    let store = env.workflow_store(&all_workflows()).unwrap();
    let chain = chain_of(&[WF_MIDDLE_AGED, WF_MULTI_DIAGNOSIS, WF_DIABETES_DRUG]);

    let mut progress = Vec::new();
    let result = ChainExecutor::new(store, RuleExecutor::new())
        .execute(&chain, source.as_ref(), &tables, |p| progress.push(p))
        .await
        .unwrap();

    assert!(!result.aborted);
    assert_eq!(result.steps.len(), 3);
    assert_eq!(progress, vec![0, 33, 67, 100]);

    let after_age = expected(|s| s.age() >= 40);
    let after_diagnosis = expected(|s| s.age() >= 40 && ClaimSpec::visits_of(s.patient) >= 2);
    let after_drug = expected(|s| {
        s.age() >= 40 && ClaimSpec::visits_of(s.patient) >= 2 && s.drug() == "Metformin"
    });

    assert_eq!(result.steps[0].input_records, source.len());
    assert_eq!(result.steps[0].output_records, after_age.len());
    assert_eq!(result.steps[1].input_records, after_age.len());
    assert_eq!(result.steps[1].output_records, after_diagnosis.len());
    assert_eq!(result.steps[2].output_records, after_drug.len());
    assert!(!after_drug.is_empty());
    assert_eq!(keys(&result.final_results.matched_rows), after_drug);
}

#[tokio::test]
async fn test_step_names_come_from_store() {
    let env = TestEnvironment::new().unwrap();
    let source = env
        .open_source("claims.jsonl", &ClaimsGenerator::rows(10))
        .unwrap();
    let store = env.workflow_store(&all_workflows()).unwrap();
    let chain = chain_of(&[WF_MIDDLE_AGED]);

    let result = ChainExecutor::new(store, RuleExecutor::new())
        .execute(&chain, source.as_ref(), &Default::default(), |_| {})
        .await
        .unwrap();

    assert_eq!(result.steps[0].workflow_name, "middle aged");
    assert_eq!(result.steps[0].workflow_id, WF_MIDDLE_AGED);
}

#[tokio::test]
async fn test_chain_aborts_when_step_yields_nothing() {
    let env = TestEnvironment::new().unwrap();
    let source = env
        .open_source("claims.jsonl", &ClaimsGenerator::rows(30))
        .unwrap();
    let store = env.workflow_store(&all_workflows()).unwrap();
    let chain = chain_of(&[WF_MIDDLE_AGED, WF_NOBODY, WF_MULTI_DIAGNOSIS]);

    let mut progress = Vec::new();
    let result = ChainExecutor::new(store, RuleExecutor::new())
        .execute(&chain, source.as_ref(), &Default::default(), |p| progress.push(p))
        .await
        .unwrap();

    assert!(result.aborted);
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[1].output_records, 0);
    assert_eq!(result.final_results.matched_count, 0);
    assert_eq!(result.final_results.total_rows, result.steps[1].input_records);
    assert_eq!(progress.last(), Some(&100));
}

#[tokio::test]
async fn test_missing_workflow_reports_completed_steps() {
    let env = TestEnvironment::new().unwrap();
    let source = env
        .open_source("claims.jsonl", &ClaimsGenerator::rows(30))
        .unwrap();
    let store = env.workflow_store(&all_workflows()).unwrap();
    let chain = chain_of(&[WF_MIDDLE_AGED, "wf-deleted"]);

    let err = ChainExecutor::new(store, RuleExecutor::new())
        .execute(&chain, source.as_ref(), &Default::default(), |_| {})
        .await
        .unwrap_err();

    assert!(err.is_workflow_not_found());
    assert_eq!(err.order, 2);
    assert_eq!(err.completed_steps.len(), 1);
    assert_eq!(err.completed_steps[0].workflow_id, WF_MIDDLE_AGED);
}
