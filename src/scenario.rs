use crate::guidance::{GuidanceSettings, GuidanceStrategy, LawType, formula::FormulaError};
use crate::models::{
    common::{PhysicsConfig, Vector3},
    missile::{Missile, MissileParams},
    target::{EvasiveParams, MotionType, SineParams, Target, TargetParams},
};
use crate::simulation::{EngagementSimulator, SimulationControls};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 組み込みプリセットの名前
pub const PRESET_NAMES: &[&str] = &["basic_intercept", "evasive_target", "high_altitude_intercept"];

/// シナリオメタデータ
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScenarioMeta {
    pub version: String,
    pub name: String,
    pub description: String,
}

/// シミュレーション設定
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub dt_s: f64,
    pub t_max_s: f64,
    pub miss_distance_threshold_m: f64,
    pub min_missile_speed_mps: f64,
    /// ランダム機動の乱数シード
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt_s: 0.01,
            t_max_s: 30.0,
            miss_distance_threshold_m: 5.0,
            min_missile_speed_mps: 50.0,
            seed: 42,
        }
    }
}

fn default_max_accel() -> f64 {
    200.0
}

fn default_min_speed() -> f64 {
    50.0
}

/// ミサイル設定
///
/// 質量・推力・抗力諸元を省略した場合は `physics` の既定値を使います。
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MissileConfig {
    pub position_m: Vector3,
    pub velocity_mps: Vector3,
    #[serde(default = "default_max_accel")]
    pub max_accel_mps2: f64,
    #[serde(default = "default_min_speed")]
    pub min_speed_mps: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mass_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thrust_n: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drag_coefficient: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_area_m2: Option<f64>,
}

/// ターゲット設定
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TargetConfig {
    pub position_m: Vector3,
    pub velocity_mps: Vector3,
    #[serde(default)]
    pub motion: MotionType,
}

/// 完全なシナリオ設定
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScenarioParameters {
    #[serde(default)]
    pub meta: ScenarioMeta,
    #[serde(default)]
    pub sim: SimulationConfig,
    pub missile: MissileConfig,
    pub target: TargetConfig,
    #[serde(default)]
    pub guidance: GuidanceSettings,
    #[serde(default)]
    pub physics: PhysicsConfig,
}

impl ScenarioParameters {
    /// YAMLファイルからシナリオ設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();

        // ファイル存在チェック
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }

        // ファイル読み込み
        let contents =
            fs::read_to_string(path).map_err(|e| ScenarioError::Io(path.to_path_buf(), e))?;

        // YAML解析
        let scenario: ScenarioParameters = serde_yaml::from_str(&contents)
            .map_err(|e| ScenarioError::Parse(path.display().to_string(), e))?;

        scenario.validate()?;

        Ok(scenario)
    }

    /// YAML文字列からシナリオ設定を読み込み
    pub fn from_yaml(contents: &str) -> Result<Self, ScenarioError> {
        let scenario: ScenarioParameters = serde_yaml::from_str(contents)
            .map_err(|e| ScenarioError::Parse("<yaml>".to_string(), e))?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// 組み込みプリセット
    pub fn preset(name: &str) -> Option<Self> {
        let (meta, sim, missile, target, law, n) = match name {
            "basic_intercept" => (
                ("基本迎撃シナリオ", "原点から発射したミサイルで等速直線運動の目標を迎撃"),
                (0.01, 30.0),
                ([0.0, 0.0, 0.0], [300.0, 0.0, 0.0], 200.0),
                ([5000.0, 3000.0, 1000.0], [-200.0, 0.0, 0.0], MotionType::Constant),
                LawType::ProportionalNavigation,
                4.0,
            ),
            "evasive_target" => (
                ("回避目標シナリオ", "速度に垂直な回避機動を行う目標の迎撃"),
                (0.005, 40.0),
                ([0.0, 0.0, 0.0], [350.0, 0.0, 0.0], 250.0),
                (
                    [6000.0, 2000.0, 500.0],
                    [-150.0, 50.0, 0.0],
                    MotionType::Evasive(EvasiveParams { frequency: 1.5, amplitude: 150.0 }),
                ),
                LawType::AugmentedProportionalNavigation,
                5.0,
            ),
            "high_altitude_intercept" => (
                ("高高度迎撃シナリオ", "大気密度の変化を考慮した高高度での迎撃"),
                (0.005, 35.0),
                ([0.0, 10000.0, 0.0], [400.0, 0.0, 0.0], 300.0),
                (
                    [8000.0, 12000.0, 2000.0],
                    [-250.0, -50.0, 100.0],
                    MotionType::Sine(SineParams { amplitude: 200.0, frequency: 0.8, phase: 0.0 }),
                ),
                LawType::OptimalGuidance,
                4.5,
            ),
            _ => return None,
        };

        Some(Self {
            meta: ScenarioMeta {
                version: "1.0".to_string(),
                name: meta.0.to_string(),
                description: meta.1.to_string(),
            },
            sim: SimulationConfig { dt_s: sim.0, t_max_s: sim.1, ..SimulationConfig::default() },
            missile: MissileConfig {
                position_m: missile.0.into(),
                velocity_mps: missile.1.into(),
                max_accel_mps2: missile.2,
                min_speed_mps: default_min_speed(),
                mass_kg: None,
                thrust_n: None,
                drag_coefficient: None,
                reference_area_m2: None,
            },
            target: TargetConfig {
                position_m: target.0.into(),
                velocity_mps: target.1.into(),
                motion: target.2,
            },
            guidance: GuidanceSettings { law, navigation_ratio: n, ..GuidanceSettings::default() },
            physics: PhysicsConfig::default(),
        })
    }

    /// 設定の基本的な検証
    pub fn validate(&self) -> Result<(), ScenarioError> {
        // 時間設定の検証
        if self.sim.dt_s <= 0.0 {
            return Err(ScenarioError::Validation("dt_s must be positive".to_string()));
        }
        if self.sim.t_max_s <= 0.0 {
            return Err(ScenarioError::Validation("t_max_s must be positive".to_string()));
        }
        if self.sim.dt_s > self.sim.t_max_s {
            return Err(ScenarioError::Validation(format!(
                "dt_s {} exceeds t_max_s {}",
                self.sim.dt_s, self.sim.t_max_s
            )));
        }
        if self.sim.miss_distance_threshold_m < 0.0 {
            return Err(ScenarioError::Validation(
                "miss_distance_threshold_m must not be negative".to_string(),
            ));
        }

        // ミサイル諸元の検証
        let missile = &self.missile;
        if !missile.position_m.is_finite() || !missile.velocity_mps.is_finite() {
            return Err(ScenarioError::Validation("missile state must be finite".to_string()));
        }
        if missile.max_accel_mps2 < 0.0 || missile.min_speed_mps < 0.0 {
            return Err(ScenarioError::Validation(
                "missile max_accel_mps2 and min_speed_mps must not be negative".to_string(),
            ));
        }
        if missile.mass_kg.unwrap_or(self.physics.default_missile_mass) <= 0.0 {
            return Err(ScenarioError::Validation("missile mass_kg must be positive".to_string()));
        }

        // ターゲットの検証
        if !self.target.position_m.is_finite() || !self.target.velocity_mps.is_finite() {
            return Err(ScenarioError::Validation("target state must be finite".to_string()));
        }
        match self.target.motion {
            MotionType::Zigzag(p) if p.frequency <= 0.0 => {
                return Err(ScenarioError::Validation("zigzag frequency must be positive".to_string()));
            }
            MotionType::Random(p) if !(0.0..=1.0).contains(&p.smooth_factor) => {
                return Err(ScenarioError::Validation(
                    "random smooth_factor must be within [0, 1]".to_string(),
                ));
            }
            _ => {}
        }

        // 大気定数の検証
        if self.physics.sea_level_temperature <= 0.0 || self.physics.gas_constant <= 0.0 {
            return Err(ScenarioError::Validation(
                "physics temperature and gas constant must be positive".to_string(),
            ));
        }

        // 誘導則の検証
        if self.guidance.law == LawType::Custom
            && self.guidance.custom_source.as_deref().is_none_or(|s| s.trim().is_empty())
        {
            return Err(ScenarioError::Validation(
                "custom guidance law requires custom_source".to_string(),
            ));
        }

        Ok(())
    }

    pub fn controls(&self) -> SimulationControls {
        SimulationControls {
            dt: self.sim.dt_s,
            max_time: self.sim.t_max_s,
            miss_distance_threshold: self.sim.miss_distance_threshold_m,
            min_missile_speed: self.sim.min_missile_speed_mps,
        }
    }

    pub fn missile_params(&self) -> MissileParams {
        let m = &self.missile;
        let mut params = MissileParams::with_defaults(
            m.position_m,
            m.velocity_mps,
            m.max_accel_mps2,
            m.min_speed_mps,
            &self.physics,
        );
        if let Some(mass) = m.mass_kg {
            params.mass = mass;
        }
        if let Some(thrust) = m.thrust_n {
            params.thrust = thrust;
        }
        if let Some(cd) = m.drag_coefficient {
            params.drag_coefficient = cd;
        }
        if let Some(area) = m.reference_area_m2 {
            params.reference_area = area;
        }
        params
    }

    pub fn target_params(&self) -> TargetParams {
        TargetParams {
            position: self.target.position_m,
            velocity: self.target.velocity_mps,
            motion: self.target.motion,
        }
    }

    /// シナリオからシミュレータを構築
    ///
    /// 独自誘導則のコンパイルに失敗した場合は `ScenarioError::Formula` を返します。
    pub fn build_simulator(&self) -> Result<EngagementSimulator, ScenarioError> {
        let guidance = GuidanceStrategy::from_settings(&self.guidance, &self.physics)?;
        let missile = Missile::new(self.missile_params(), &self.physics);
        let target = Target::new(self.target_params(), self.sim.seed);
        Ok(EngagementSimulator::new(missile, target, guidance, self.controls()))
    }

    /// シナリオの概要を表示
    pub fn print_summary(&self) {
        println!("=== シナリオ情報 ===");
        println!("名前: {}", self.meta.name);
        println!("説明: {}", self.meta.description);
        println!("バージョン: {}", self.meta.version);
        println!();

        println!("=== シミュレーション設定 ===");
        println!("時間刻み: {:.3}秒", self.sim.dt_s);
        println!("最大時間: {:.1}秒", self.sim.t_max_s);
        println!("迎撃判定距離: {:.1}m", self.sim.miss_distance_threshold_m);
        println!("最小ミサイル速度: {:.1}m/s", self.sim.min_missile_speed_mps);
        println!("シード値: {}", self.sim.seed);
        println!();

        let m = &self.missile;
        println!("=== ミサイル ===");
        println!("初期位置: ({:.0}, {:.0}, {:.0}) m", m.position_m.x, m.position_m.y, m.position_m.z);
        println!("初期速度: ({:.0}, {:.0}, {:.0}) m/s", m.velocity_mps.x, m.velocity_mps.y, m.velocity_mps.z);
        println!("最大加速度: {:.0} m/s²", m.max_accel_mps2);
        println!();

        let t = &self.target;
        println!("=== ターゲット ===");
        println!("初期位置: ({:.0}, {:.0}, {:.0}) m", t.position_m.x, t.position_m.y, t.position_m.z);
        println!("初期速度: ({:.0}, {:.0}, {:.0}) m/s", t.velocity_mps.x, t.velocity_mps.y, t.velocity_mps.z);
        println!("機動: {}", t.motion.name());
        println!();

        println!("=== 誘導則 ===");
        println!("種類: {}", self.guidance.law.name());
        println!("航法比 N: {:.1}", self.guidance.navigation_ratio);
        for (name, value) in &self.guidance.params {
            println!("  params.{}: {}", name, value);
        }
        if let Some(source) = &self.guidance.custom_source {
            println!("ソース:");
            for line in source.lines() {
                println!("  {}", line);
            }
        }
    }
}

/// シナリオ読み込みエラー
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("シナリオファイルが見つかりません: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("ファイル読み込みエラー {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("YAML解析エラー {0}: {1}")]
    Parse(String, #[source] serde_yaml::Error),

    #[error("設定検証エラー: {0}")]
    Validation(String),

    #[error("誘導則のコンパイルエラー: {0}")]
    Formula(#[from] FormulaError),
}
