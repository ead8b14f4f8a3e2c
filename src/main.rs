use clap::{Arg, ArgAction, Command, builder::PossibleValuesParser};
use guidsim::logging::{LogConfig, LogOutput, init_logging, level_for_verbosity, parse_log_level};
use guidsim::scenario::{PRESET_NAMES, ScenarioParameters};
use guidsim::simulation::{PerformanceReport, TerminationOutcome, TerminationReason};
use guidsim::trace::SimulationTrace;
use serde::Serialize;
use std::fs;
use tracing::info;

/// `--output` で書き出す実行結果
#[derive(Serialize)]
struct RunReport<'a> {
    outcome: &'a TerminationOutcome,
    performance: Option<PerformanceReport>,
    trace: &'a SimulationTrace,
}

fn main() {
    // コマンドライン引数の解析
    let matches = Command::new("guidsim")
        .version("0.1.0")
        .about("誘導交戦シミュレーション (Guidance Engagement Simulation)")
        .long_about(
            "ミサイルと機動ターゲットの3次元交戦シミュレータ\n\
             固定時間刻みで運動方程式を積分し、誘導則の性能を評価します。",
        )
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("シナリオファイル(.yaml)のパスを指定")
                .conflicts_with("preset"),
        )
        .arg(
            Arg::new("preset")
                .short('p')
                .long("preset")
                .value_name("NAME")
                .help("組み込みプリセットを指定")
                .value_parser(PossibleValuesParser::new(PRESET_NAMES.iter().copied())),
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(ArgAction::SetTrue)
                .help("シナリオの情報のみ表示して終了"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("終了結果・評価指標・時系列をYAMLで書き出す"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("詳細出力レベル (-v: 進行状況, -vv: ステップごとの詳細)"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("ログレベル (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("TARGET")
                .default_value("console")
                .help("ログ出力先 (console, file, both)"),
        )
        .get_matches();

    let verbose_level = matches.get_count("verbose");
    let level = match matches.get_one::<String>("log-level") {
        Some(level) => parse_log_level(level),
        None => level_for_verbosity(verbose_level),
    };
    let output = match matches.get_one::<String>("log-output").map(|s| s.parse::<LogOutput>()) {
        Some(Ok(output)) => output,
        Some(Err(e)) => {
            eprintln!("エラー: {}", e);
            std::process::exit(1);
        }
        None => LogOutput::Console,
    };

    let log_config = LogConfig { level, output, ..LogConfig::default() };
    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ログ初期化エラー: {}", e);
            std::process::exit(1);
        }
    };

    println!("誘導交戦シミュレーション - guidsim v0.1.0");
    println!();

    let scenario: Result<ScenarioParameters, Box<dyn std::error::Error>> = if let Some(path) = matches.get_one::<String>("scenario") {
        ScenarioParameters::from_file(path).map_err(|e| e.into())
    } else if let Some(name) = matches.get_one::<String>("preset") {
        ScenarioParameters::preset(name).ok_or_else(|| format!("不明なプリセット: {}", name).into())
    } else {
        show_default_help();
        return;
    };

    let output_path = matches.get_one::<String>("output").map(String::as_str);
    let result = scenario.and_then(|s| run_scenario(&s, matches.get_flag("info"), output_path));
    if let Err(e) = result {
        eprintln!("エラー: {}", e);
        std::process::exit(1);
    }
}

/// シナリオを実行して結果を表示
fn run_scenario(
    scenario: &ScenarioParameters,
    info_only: bool,
    output_path: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    scenario.print_summary();
    println!();

    // 情報表示のみの場合
    if info_only {
        return Ok(());
    }

    let mut simulator = scenario.build_simulator()?;
    let outcome = simulator.run();
    let performance = simulator.evaluate_performance();

    print_outcome(&outcome);
    if let Some(report) = &performance {
        print_performance(report);
    }
    let failures = simulator.guidance().custom_failures();
    if failures > 0 {
        println!("独自誘導則の評価失敗: {}回（その間の指令はゼロ）", failures);
    }

    if let Some(path) = output_path {
        let report = RunReport { outcome: &outcome, performance, trace: simulator.trace() };
        fs::write(path, serde_yaml::to_string(&report)?)?;
        info!(path, records = simulator.trace().len(), "実行結果を書き出しました");
        println!("実行結果を書き出しました: {}", path);
    }

    Ok(())
}

fn print_outcome(outcome: &TerminationOutcome) {
    let label = match outcome.reason {
        TerminationReason::Intercepted => "迎撃成功",
        TerminationReason::Timeout => "時間切れ",
        TerminationReason::LowSpeed => "ミサイル速度低下",
        TerminationReason::Running => "実行中",
    };
    println!("=== 交戦結果 ===");
    println!("終了理由: {} ({})", label, outcome.reason.name());
    println!("終了時刻: {:.2}秒", outcome.time);
    println!("ミス距離: {:.2}m", outcome.miss_distance);
    let m = &outcome.missile;
    println!(
        "ミサイル最終位置: ({:.1}, {:.1}, {:.1}) m, 速度 {:.1} m/s",
        m.position.x, m.position.y, m.position.z, m.speed
    );
    let t = &outcome.target;
    println!("ターゲット最終位置: ({:.1}, {:.1}, {:.1}) m", t.position.x, t.position.y, t.position.z);
    println!();
}

fn print_performance(report: &PerformanceReport) {
    println!("=== 評価指標 ===");
    println!("迎撃判定: {}", if report.intercepted { "成功" } else { "失敗" });
    println!("ミス距離: {:.2}m", report.miss_distance);
    println!("交戦時間: {:.2}秒", report.intercept_time);
    println!(
        "指令加速度: 平均 {:.1} / 最大 {:.1} / RMS {:.1} m/s²",
        report.mean_command, report.max_command, report.rms_command
    );
    println!("視線角速度 RMS: {:.4} rad/s", report.rms_los_rate);
    println!("制御エネルギー: {:.1}", report.energy);
    println!("平均接近速度: {:.1} m/s", report.mean_closing_velocity);
    println!("記録数: {}", report.data_points);
}

/// デフォルトヘルプとプリセット一覧を表示
fn show_default_help() {
    println!("使用方法:");
    println!("  guidsim [オプション]");
    println!();
    println!("オプション:");
    println!("  -s, --scenario <FILE>   シナリオファイルを指定して実行");
    println!("  -p, --preset <NAME>     組み込みプリセットを指定して実行");
    println!("  -i, --info              シナリオ情報のみ表示");
    println!("  -o, --output <FILE>     実行結果をYAMLで書き出す");
    println!("  -v, --verbose           詳細出力 (複数指定で詳細レベル上昇)");
    println!("      --log-level <LEVEL> ログレベル");
    println!("      --log-output <TARGET> ログ出力先 (console, file, both)");
    println!("  -h, --help              このヘルプを表示");
    println!();
    println!("利用可能なプリセット:");
    for name in PRESET_NAMES {
        if let Some(preset) = ScenarioParameters::preset(name) {
            println!("  {:<24} - {}", name, preset.meta.description);
        }
    }
    println!();
    println!("例:");
    println!("  guidsim -p basic_intercept");
    println!("  guidsim -s scenarios/custom_pn.yaml -v");
    println!("  guidsim -s scenarios/evasive_zigzag.yaml -i");
}
