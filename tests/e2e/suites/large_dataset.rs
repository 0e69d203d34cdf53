//! 大数据集端到端测试
//!
//! 阈值调小后 JSON Lines 文件走懒加载分块读取，结果必须与整体加载一致。

use crate::data::{ClaimsGenerator, diabetes_drug, multi_diagnosis};
use crate::setup::TestEnvironment;
use cohort_shared::config::EngineConfig;
use rule_engine::{
    Aggregation, EagerSource, GroupCondition, JsonLinesLoader, LazySource, Operator, RuleCondition,
    RuleExecutor, RuleGroup,
};

const PATIENTS: usize = 400;

fn small_chunks() -> EngineConfig {
    EngineConfig {
        large_dataset_threshold: 100,
        batch_size: 64,
        chunk_size: 50,
        cache_capacity_chunks: 2,
        evict_every_batches: 3,
        ..EngineConfig::default()
    }
}

fn cohort_rules() -> RuleGroup {
    RuleGroup::or()
        .child(multi_diagnosis().rules)
        .child(
            RuleGroup::and()
                .condition(RuleCondition::new("Cost", Operator::Between, "100").with_value2("300"))
                .condition(RuleCondition::new("VisitDate", Operator::GreaterThan, "1/15/2024")),
        )
}

#[tokio::test]
async fn test_lazy_scan_matches_eager_evaluation() {
    let env = TestEnvironment::with_config(small_chunks()).unwrap();
    let rows = ClaimsGenerator::rows(PATIENTS);
    let source = env.open_source("claims.jsonl", &rows).unwrap();
    assert_eq!(source.len(), rows.len());

    let path = env.write_jsonl("claims-copy.jsonl", &rows).unwrap();
    let eager = EagerSource::new(JsonLinesLoader::open(path).unwrap().read_all().unwrap());

    let executor = RuleExecutor::with_config(env.config.clone());
    let rules = cohort_rules();
    let lazy_result = executor
        .evaluate_rules(source.as_ref(), &rules, &Default::default())
        .await
        .unwrap();
    let eager_result = executor
        .evaluate_rules(&eager, &rules, &Default::default())
        .await
        .unwrap();

    assert_eq!(lazy_result.total_rows, eager_result.total_rows);
    assert_eq!(lazy_result.matched_count, eager_result.matched_count);
    assert_eq!(lazy_result.group_stats, eager_result.group_stats);
    let lazy_ids: Vec<_> = lazy_result.matched_rows.iter().map(|r| r.get("PatientId")).collect();
    let eager_ids: Vec<_> = eager_result.matched_rows.iter().map(|r| r.get("PatientId")).collect();
    assert_eq!(lazy_ids, eager_ids);
}

#[tokio::test]
async fn test_group_condition_spanning_chunks() {
    let env = TestEnvironment::with_config(small_chunks()).unwrap();
    let rows = ClaimsGenerator::rows(PATIENTS);
    let path = env.write_jsonl("claims.jsonl", &rows).unwrap();
    let lazy = LazySource::new(JsonLinesLoader::open(path).unwrap(), &env.config);

    // 恰好三次就诊的患者
    let rules = RuleGroup::and().group_condition(GroupCondition::new(
        "PatientId",
        "Cost",
        Aggregation::Count,
        Operator::Equals,
        3.0,
    ));
    let result = RuleExecutor::with_config(env.config.clone())
        .evaluate_rules(&lazy, &rules, &Default::default())
        .await
        .unwrap();

    let three_visit_patients = (0..PATIENTS).filter(|p| p % 3 == 2).count();
    assert_eq!(result.matched_count, three_visit_patients * 3);
    let stats = result.group_stats.unwrap();
    assert_eq!(stats.total_groups, PATIENTS);
    assert_eq!(stats.matched_groups, three_visit_patients);
    assert!(lazy.chunk_loads() > rows.len() / env.config.chunk_size);
}

#[tokio::test]
async fn test_missing_reference_table_on_large_source() {
    let env = TestEnvironment::with_config(small_chunks()).unwrap();
    let source = env
        .open_source("claims.jsonl", &ClaimsGenerator::rows(PATIENTS))
        .unwrap();

    let result = RuleExecutor::with_config(env.config.clone())
        .with_trace()
        .evaluate_rules(source.as_ref(), &diabetes_drug().rules, &Default::default())
        .await
        .unwrap();

    assert_eq!(result.matched_count, 0);
    assert!(result.trace.iter().any(|t| t.contains("diabetes-drugs")));
}
