//! End-to-end runs of the wizards and the loop CSV conversion

use ear_tools::config::{AppCsvSettings, WizardScope, WizardSettings};
use ear_tools::telemetry::convert_loop_file;
use ear_tools::wizard::{collect, render, run_wizard, Prompter};
use std::io::Cursor;
use tempfile::TempDir;

/// Two named types, one global hard-capped EARGM, no energy cap, tags for both
const CONF_ANSWERS: &str = "\
2
y
cpu,gpu
10
500
300
2
1500
900
y
1

n


gm0

n
n
n

root


n
n
80
n



y
n
n
200
y
1410
rapl


";

fn prompter(input: &str) -> Prompter<Cursor<Vec<u8>>, Vec<u8>> {
    Prompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
}

#[test]
fn test_conf_wizard_renders_full_file() {
    let mut p = prompter(CONF_ANSWERS);
    let model = collect(&mut p, WizardScope::Cluster, false).unwrap();
    let text = render(&model, WizardScope::Cluster);

    assert!(text.starts_with("# EAR Configuration File\n"));
    assert!(!text.contains("DBIp="));
    assert!(text.contains("\nEARGMId=1 energy=0 power=8000 node=gm0 port=50100\n"));
    assert!(text.contains("EARGMPowerCapMode=1\n"));
    assert!(text.contains("EARGMUseLog=1\n"));
    assert!(text.contains("AuthorizedUsers=root\n"));

    // Hard mode: global budget split by max power
    assert!(text.contains(
        "Tag=cpu default=yes max_avx512=0 max_avx2=0 max_power=500 min_power=80 error_power=550 coeffs=coeffs.default powercap=500 "
    ));
    assert!(text.contains(" energy_plugin=energy_rapl.so gpu_powercap_plugin=gpu.so max_powercap=1500 gpu_def_freq=1410 "));
    assert!(text.contains("\nIsland=0 Nodes=[cpu-nodes] Tag=cpu EARGMID=1\n"));
    assert!(text.contains("\nIsland=1 Nodes=[gpu-nodes] Tag=gpu EARGMID=1\n"));
}

#[test]
fn test_eargm_wizard_from_answers_file() {
    let dir = TempDir::new().unwrap();
    let answers = dir.path().join("answers.txt");
    let output = dir.path().join("eargm.conf");
    let dump = dir.path().join("model.json");
    // one unnamed type, no powercap, energy cap in MJ with defaults, no log
    std::fs::write(&answers, "1\nn\n8\n400\n250\nn\ny\n\n\nm\n\n\nn\nn\n").unwrap();

    let settings = WizardSettings {
        scope: WizardScope::Eargm,
        with_daemons: false,
        output: Some(output.clone()),
        answers: Some(answers),
        dump_json: Some(dump.clone()),
    };
    let outcome = run_wizard(&settings).unwrap();

    let written = std::fs::read_to_string(&output).unwrap();
    assert_eq!(written, outcome.text);
    assert!(written.contains("EARGMUnits=M\n"));
    assert!(written.contains("EARGMPeriodT2=2592000\n"));
    assert!(written.contains("EARGMWarningsPerc=0,0,0\n"));
    assert!(written.contains("EARGMUseLog=0\n"));
    assert!(written.contains("#EARGMId=0 energy=0 power=0\n"));
    assert!(!written.contains("Island="));

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&dump).unwrap()).unwrap();
    assert_eq!(json["cluster"]["types"][0]["name"], "type1");
    assert_eq!(json["energy"]["limit"], 8 * 250 * 2_592_000u64 / 1_000_000);
}

#[test]
fn test_truncated_answers_file_fails() {
    let dir = TempDir::new().unwrap();
    let answers = dir.path().join("answers.txt");
    std::fs::write(&answers, "1\nn\n").unwrap();

    let settings = WizardSettings {
        scope: WizardScope::Eargm,
        output: Some(dir.path().join("out.conf")),
        answers: Some(answers),
        ..WizardSettings::default()
    };
    let err = run_wizard(&settings).unwrap_err();
    assert!(err.is_aborted());
    assert!(err.to_string().contains("after 2 answers"));
    assert!(!dir.path().join("out.conf").exists());
}

const LOOPS: &str = "\
JOBID;STEPID;APPID;NODENAME;TIMESTAMP;ELAPSED;LOOPID;DC_NODE_POWER_W;CPI;DPOPS_256
100;0;0;n1;1700000010;10;1;300;0.5;1000
100;0;0;n1;1700000020;20;1;320;0.7;3000
100;0;0;n2;1700000015;5;1;280;0.6;500
101;0;0;n1;1700000100;10;1;250;1.0;100
";

#[test]
fn test_app_csv_conversion_with_exclusions() {
    let dir = TempDir::new().unwrap();
    let loops = dir.path().join("loops.csv");
    let existing = dir.path().join("existing_apps.csv");
    std::fs::write(&loops, LOOPS).unwrap();
    std::fs::write(&existing, "JOBID;STEPID;APPID;NODENAME;CPI\n101;0;0;n1;1.0\n").unwrap();

    let settings = AppCsvSettings {
        loop_file: loops,
        exclude_file: Some(existing),
        output: None,
        print: false,
        show_progress: false,
    };
    let summary = convert_loop_file(&settings).unwrap();

    assert_eq!(summary.rows_read, 4);
    assert_eq!(summary.rows_excluded, 1);
    assert_eq!(summary.groups_written, 2);
    assert_eq!(summary.output, dir.path().join("apps_loops.csv"));

    let text = std::fs::read_to_string(&summary.output).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "JOBID;STEPID;APPID;NODENAME;CPI;DC_NODE_POWER_W;DPOPS_256;START_TIME;START_DATE;END_TIME;END_DATE"
    );
    assert_eq!(
        lines[1],
        "100;0;0;n1;0.6;310;4000;1700000000;2023-11-14 22:13:20;1700000020;2023-11-14 22:13:40"
    );
    assert!(lines[2].starts_with("100;0;0;n2;0.6;280;500;1700000010;"));
    assert_eq!(lines.len(), 3);
}

#[test]
fn test_app_csv_missing_input() {
    let dir = TempDir::new().unwrap();
    let settings = AppCsvSettings {
        loop_file: dir.path().join("absent.csv"),
        exclude_file: None,
        output: None,
        print: false,
        show_progress: false,
    };
    assert!(convert_loop_file(&settings).is_err());
}

/// Cluster, then DB, EARD and per-type EARDBD with a mirror; no capping
const DAEMON_ANSWERS: &str = "\
2
y
cpu,gpu
10
500
300
2
1500
900
y
10.0.0.5

40


secret
n






n
eardbd.so, csv.so
per-type
cpu
db1
y
gpu
db2
y
db3







n
n




n
n
80
n



y
n
n
200
n



";

#[test]
fn test_conf_wizard_with_daemon_sections() {
    let mut p = prompter(DAEMON_ANSWERS);
    let model = collect(&mut p, WizardScope::Cluster, true).unwrap();
    let text = render(&model, WizardScope::Cluster);

    assert!(text.contains("\nDBIp=10.0.0.5\n"));
    assert!(text.contains("\nDBPassw=secret\n"));
    assert!(text.contains("\nDBPort=3306\n"));
    assert!(text.contains("\nDBMaxConnections=40\n"));
    assert!(text.contains("\nDBCommandsUser=\n"));
    assert!(text.contains("\nNodeDaemonPort=50001\n"));
    assert!(text.contains("\nNodeUseLog=0\n"));
    assert!(text.contains("\nEARDReportPlugins=eardbd.so:csv.so\n"));
    assert!(text.contains("\nDBDaemonPortTCP=50002\n"));
    assert!(text.contains("\nDBDaemonSyncPort=50004\n"));
    assert!(text.contains("\nEARDBDReportPlugins=mysql.so\n"));

    let db = text.find("DBIp=").unwrap();
    let eargm = text.find("EARGMUseAggregated=").unwrap();
    assert!(db < eargm);

    assert!(text.contains("\nIsland=0 Nodes=[cpu-nodes] Tag=cpu DBIP=db1 DBSECIP=db3\n"));
    assert!(text.ends_with("Island=1 Nodes=[gpu-nodes] Tag=gpu DBIP=db2 DBSECIP=db3\n"));
}
