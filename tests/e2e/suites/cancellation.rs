//! 取消执行端到端测试

use crate::data::{ClaimsGenerator, WF_MIDDLE_AGED, WF_MULTI_DIAGNOSIS, all_workflows, chain_of};
use crate::setup::TestEnvironment;
use rule_engine::{ChainExecutor, RuleError, RuleExecutor};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_cancelled_token_stops_evaluation() {
    let env = TestEnvironment::new().unwrap();
    let source = env
        .open_source("claims.jsonl", &ClaimsGenerator::rows(50))
        .unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let err = RuleExecutor::with_config(env.config.clone())
        .with_cancellation(token)
        .evaluate_rules(source.as_ref(), &crate::data::middle_aged().rules, &Default::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RuleError::Cancelled { .. }));
}

#[tokio::test]
async fn test_cancelled_chain_surfaces_step_error() {
    let env = TestEnvironment::new().unwrap();
    let source = env
        .open_source("claims.jsonl", &ClaimsGenerator::rows(50))
        .unwrap();
    let store = env.workflow_store(&all_workflows()).unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let err = ChainExecutor::new(
        store,
        RuleExecutor::with_config(env.config.clone()).with_cancellation(token),
    )
    .execute(
        &chain_of(&[WF_MIDDLE_AGED, WF_MULTI_DIAGNOSIS]),
        source.as_ref(),
        &Default::default(),
        |_| {},
    )
    .await
    .unwrap_err();

    assert!(matches!(err.source, RuleError::Cancelled { .. }));
    assert!(err.completed_steps.is_empty());
    assert_eq!(err.order, 1);
}
