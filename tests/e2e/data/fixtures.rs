//! 工作流 fixtures

use rule_engine::{
    Aggregation, GroupCondition, Operator, ReferenceCondition, ReferenceMatchType, RuleCondition,
    RuleGroup, Workflow, WorkflowChain, WorkflowChainStep,
};

pub const WF_MIDDLE_AGED: &str = "wf-middle-aged";
pub const WF_MULTI_DIAGNOSIS: &str = "wf-multi-diagnosis";
pub const WF_DIABETES_DRUG: &str = "wf-diabetes-drug";
pub const WF_NOBODY: &str = "wf-nobody";

/// 年龄不小于 40
pub fn middle_aged() -> Workflow {
    Workflow::new(
        "middle aged",
        RuleGroup::and().condition(RuleCondition::new("Age", Operator::GreaterEqual, "40")),
    )
    .with_id(WF_MIDDLE_AGED)
}

/// 至少两个不同诊断编码的患者
pub fn multi_diagnosis() -> Workflow {
    Workflow::new(
        "multi diagnosis",
        RuleGroup::and().group_condition(
            GroupCondition::new(
                "PatientId",
                "Code",
                Aggregation::DistinctCount,
                Operator::GreaterEqual,
                2.0,
            )
            .with_id("gc-multi-diagnosis"),
        ),
    )
    .with_id(WF_MULTI_DIAGNOSIS)
}

/// 服用降糖药的记录
pub fn diabetes_drug() -> Workflow {
    Workflow::new(
        "diabetes drug",
        RuleGroup::and().reference(ReferenceCondition::new(
            ReferenceMatchType::Match,
            "Drug",
            "diabetes-drugs",
            "Name",
        )),
    )
    .with_id(WF_DIABETES_DRUG)
}

/// 不会匹配任何记录
pub fn nobody() -> Workflow {
    Workflow::new(
        "nobody",
        RuleGroup::and().condition(RuleCondition::new("Age", Operator::GreaterThan, "200")),
    )
    .with_id(WF_NOBODY)
}

pub fn all_workflows() -> Vec<Workflow> {
    vec![middle_aged(), multi_diagnosis(), diabetes_drug(), nobody()]
}

pub fn chain_of(workflow_ids: &[&str]) -> WorkflowChain {
    WorkflowChain::new(
        "e2e",
        workflow_ids
            .iter()
            .enumerate()
            .map(|(i, id)| WorkflowChainStep::new(*id, i as u32 + 1))
            .collect(),
    )
}
