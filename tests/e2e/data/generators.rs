//! 数据生成器
//!
//! 生成确定性的理赔数据集，便于用简单的判定函数独立计算期望结果。

use serde_json::{Value, json};

pub const CODES: [&str; 3] = ["E11", "I10", "E78"];

/// 单条理赔记录的生成参数
#[derive(Debug, Clone, Copy)]
pub struct ClaimSpec {
    pub patient: usize,
    pub visit: usize,
}

impl ClaimSpec {
    pub fn patient_id(&self) -> String {
        format!("P{:05}", self.patient)
    }

    /// 年龄 30..59，每个患者固定
    pub fn age(&self) -> u64 {
        30 + (self.patient % 30) as u64
    }

    pub fn code(&self) -> &'static str {
        CODES[self.visit % CODES.len()]
    }

    pub fn drug(&self) -> &'static str {
        if (self.patient + self.visit) % 4 == 0 {
            "Metformin"
        } else {
            "Aspirin"
        }
    }

    /// 每个患者的就诊次数 1..3
    pub fn visits_of(patient: usize) -> usize {
        1 + patient % 3
    }

    pub fn to_json(&self) -> Value {
        json!({
            "PatientId": self.patient_id(),
            "Age": self.age(),
            "Code": self.code(),
            "Drug": self.drug(),
            "VisitDate": format!("{}/{}/2024", 1 + self.visit, 1 + self.patient % 28),
            "Cost": (self.patient * 10 + self.visit) as f64 / 4.0,
        })
    }
}

/// 理赔数据生成器
pub struct ClaimsGenerator;

impl ClaimsGenerator {
    /// 按患者顺序生成全部记录参数
    pub fn specs(patients: usize) -> Vec<ClaimSpec> {
        (0..patients)
            .flat_map(|patient| {
                (0..ClaimSpec::visits_of(patient)).map(move |visit| ClaimSpec { patient, visit })
            })
            .collect()
    }

    pub fn rows(patients: usize) -> Vec<Value> {
        Self::specs(patients).iter().map(ClaimSpec::to_json).collect()
    }

    /// 降糖药引用表
    pub fn diabetes_drugs() -> Vec<Value> {
        vec![
            json!({"Name": "metformin ", "Class": "biguanide"}),
            json!({"Name": "Insulin", "Class": "hormone"}),
        ]
    }
}
