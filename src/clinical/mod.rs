//! CKD 위험도 계산 모듈
//!
//! 혈청 크레아티닌으로 eGFR을 추정하고, eGFR(G)·UACR(A) 범주를
//! KDIGO 위험도 매트릭스(1~4)로 매핑합니다.
//!
//! ref: https://www.kidney.org/professionals/gfr_calculator (CKD-EPI, race-free)
//! ref: https://kdigo.org/guidelines/ckd-evaluation-and-management/

use serde::{Deserialize, Serialize};

/// µmol/L → mg/dL 변환 계수
pub const CREATININE_UMOL_PER_MG_DL: f64 = 88.4;

/// 연령 보정 계수 (0.993^age)
const AGE_FACTOR: f64 = 0.993;

// ============================================================================
// Sex
// ============================================================================

/// 성별 (eGFR 공식의 기준값/지수가 달라짐)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Female,
    Male,
}

impl Sex {
    /// 원천 데이터의 성별 코드 파싱 ("F", "female", "M", "male" 등)
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "f" | "female" | "w" => Some(Sex::Female),
            "m" | "male" => Some(Sex::Male),
            _ => None,
        }
    }

    /// (기준값 κ, κ 이하 지수 α, 계수)
    fn egfr_parameters(self) -> (f64, f64, f64) {
        match self {
            Sex::Female => (0.7, -0.329, 144.0),
            Sex::Male => (0.9, -0.411, 141.0),
        }
    }
}

impl std::str::FromStr for Sex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sex::parse(s).ok_or_else(|| format!("Unknown sex code: {}", s))
    }
}

// ============================================================================
// eGFR
// ============================================================================

/// κ 초과 구간 지수 (남녀 공통)
const EXPONENT_ABOVE_THRESHOLD: f64 = -1.209;

/// eGFR 추정 (mL/min/1.73m²)
///
/// # Arguments
/// * `creatinine_umol_l` - 혈청 크레아티닌 (µmol/L)
/// * `sex` - 성별
/// * `age` - 나이 (년)
///
/// # Returns
/// 크레아티닌이 양의 유한값이고 나이가 0 이상일 때만 `Some`
pub fn estimate_egfr(creatinine_umol_l: f64, sex: Sex, age: f64) -> Option<f64> {
    if !creatinine_umol_l.is_finite() || creatinine_umol_l <= 0.0 {
        return None;
    }
    if !age.is_finite() || age < 0.0 {
        return None;
    }

    let scr = creatinine_umol_l / CREATININE_UMOL_PER_MG_DL;
    let (kappa, alpha, coefficient) = sex.egfr_parameters();
    let exponent = if scr <= kappa {
        alpha
    } else {
        EXPONENT_ABOVE_THRESHOLD
    };

    Some(coefficient * (scr / kappa).powf(exponent) * AGE_FACTOR.powf(age))
}

// ============================================================================
// Staging
// ============================================================================

/// eGFR 범주 (G1 ~ G5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum GfrCategory {
    G1,
    G2,
    G3a,
    G3b,
    G4,
    G5,
}

impl GfrCategory {
    /// 심각도 오름차순 전체 목록
    pub const ALL: [GfrCategory; 6] = [
        GfrCategory::G1,
        GfrCategory::G2,
        GfrCategory::G3a,
        GfrCategory::G3b,
        GfrCategory::G4,
        GfrCategory::G5,
    ];

    /// eGFR 값으로 범주 결정 (NaN/무한대는 `None`)
    pub fn from_egfr(egfr: f64) -> Option<Self> {
        if !egfr.is_finite() {
            return None;
        }
        let category = if egfr >= 90.0 {
            GfrCategory::G1
        } else if egfr >= 60.0 {
            GfrCategory::G2
        } else if egfr >= 45.0 {
            GfrCategory::G3a
        } else if egfr >= 30.0 {
            GfrCategory::G3b
        } else if egfr >= 15.0 {
            GfrCategory::G4
        } else {
            GfrCategory::G5
        };
        Some(category)
    }

    fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GfrCategory::G1 => "G1",
            GfrCategory::G2 => "G2",
            GfrCategory::G3a => "G3a",
            GfrCategory::G3b => "G3b",
            GfrCategory::G4 => "G4",
            GfrCategory::G5 => "G5",
        }
    }
}

/// 알부민뇨 범주 (A1 ~ A3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum AlbuminuriaCategory {
    A1,
    A2,
    A3,
}

impl AlbuminuriaCategory {
    pub const ALL: [AlbuminuriaCategory; 3] = [
        AlbuminuriaCategory::A1,
        AlbuminuriaCategory::A2,
        AlbuminuriaCategory::A3,
    ];

    /// UACR 값으로 범주 결정 (NaN/무한대는 `None`)
    pub fn from_uacr(uacr: f64) -> Option<Self> {
        if !uacr.is_finite() {
            return None;
        }
        let category = if uacr < 3.0 {
            AlbuminuriaCategory::A1
        } else if uacr < 30.0 {
            AlbuminuriaCategory::A2
        } else {
            AlbuminuriaCategory::A3
        };
        Some(category)
    }

    fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlbuminuriaCategory::A1 => "A1",
            AlbuminuriaCategory::A2 => "A2",
            AlbuminuriaCategory::A3 => "A3",
        }
    }
}

// ============================================================================
// Risk Matrix
// ============================================================================

/// KDIGO 위험도 매트릭스 (행: G1..G5, 열: A1..A3)
const RISK_MATRIX: [[u8; 3]; 6] = [
    [1, 2, 3], // G1
    [1, 2, 3], // G2
    [2, 3, 4], // G3a
    [3, 4, 4], // G3b
    [4, 4, 4], // G4
    [4, 4, 4], // G5
];

/// CKD 위험도 단계 (1 = 낮음 ~ 4 = 매우 높음)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskStage {
    Low = 1,
    Moderate = 2,
    High = 3,
    VeryHigh = 4,
}

impl RiskStage {
    /// 범주 쌍으로 위험도 조회 (18개 조합 전체에 정의됨)
    pub fn from_categories(gfr: GfrCategory, albuminuria: AlbuminuriaCategory) -> Self {
        // 매트릭스 값은 항상 1..=4
        match RISK_MATRIX[gfr.index()][albuminuria.index()] {
            1 => RiskStage::Low,
            2 => RiskStage::Moderate,
            3 => RiskStage::High,
            _ => RiskStage::VeryHigh,
        }
    }

    /// 정수 값 (1~4)
    pub fn value(self) -> u8 {
        self as u8
    }

    /// 정수 값에서 변환
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            1 => Some(RiskStage::Low),
            2 => Some(RiskStage::Moderate),
            3 => Some(RiskStage::High),
            4 => Some(RiskStage::VeryHigh),
            _ => None,
        }
    }

    /// 대시보드 표시용 라벨
    pub fn label(self) -> &'static str {
        match self {
            RiskStage::Low => "Low",
            RiskStage::Moderate => "Moderate",
            RiskStage::High => "High",
            RiskStage::VeryHigh => "Very High",
        }
    }
}

impl Serialize for RiskStage {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.value())
    }
}

impl<'de> Deserialize<'de> for RiskStage {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        RiskStage::from_value(value)
            .ok_or_else(|| serde::de::Error::custom(format!("risk must be 1-4, got {}", value)))
    }
}

impl std::fmt::Display for RiskStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.value(), self.label())
    }
}

/// eGFR·UACR로 위험도 분류
///
/// 둘 중 하나라도 없거나 유한하지 않으면 위험도는 정의되지 않습니다 (`None`).
pub fn classify_risk(egfr: Option<f64>, uacr: Option<f64>) -> Option<RiskStage> {
    let gfr = GfrCategory::from_egfr(egfr?)?;
    let albuminuria = AlbuminuriaCategory::from_uacr(uacr?)?;
    Some(RiskStage::from_categories(gfr, albuminuria))
}

// ============================================================================
// Assessment
// ============================================================================

/// 단일 시점 위험도 평가 결과
#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub egfr: Option<f64>,
    pub uacr: Option<f64>,
    pub gfr_category: Option<GfrCategory>,
    pub albuminuria_category: Option<AlbuminuriaCategory>,
    pub risk: Option<RiskStage>,
}

/// 검사값으로 전체 평가 수행
pub fn assess(
    creatinine_umol_l: Option<f64>,
    sex: Sex,
    age: f64,
    uacr: Option<f64>,
) -> RiskAssessment {
    let egfr = creatinine_umol_l.and_then(|scr| estimate_egfr(scr, sex, age));
    RiskAssessment {
        egfr,
        uacr,
        gfr_category: egfr.and_then(GfrCategory::from_egfr),
        albuminuria_category: uacr.and_then(AlbuminuriaCategory::from_uacr),
        risk: classify_risk(egfr, uacr),
    }
}

// ============================================================================
// Tests
// ============================================================================
