//! Database and daemon questions for the full configuration

use super::model::{
    ClusterModel, DaemonsConfig, DatabaseConfig, DbManagerConfig, DbManagerPlacement,
    NodeDaemonConfig,
};
use super::prompt::Prompter;
use crate::config::DEFAULT_EARD_PORT;
use crate::error::Result;
use std::io::{BufRead, Write};
use std::net::Ipv4Addr;

/// Report plugins the daemons can load
pub const REPORT_PLUGINS: [&str; 13] = [
    "eardbd.so",
    "csv.so",
    "csv_ts.so",
    "dcdb.so",
    "dcgmi.so",
    "eard.so",
    "examon.so",
    "mpi_node_metrics.so",
    "mpitrace.so",
    "mysql.so",
    "prometheus.so",
    "psql.so",
    "sysfs.so",
];

/// Every plugin in `plugins` is known and the list is not empty
pub fn valid_plugins(plugins: &[String]) -> bool {
    !plugins.is_empty() && plugins.iter().all(|p| REPORT_PLUGINS.contains(&p.as_str()))
}

fn ask_plugins<R: BufRead, W: Write>(
    p: &mut Prompter<R, W>,
    daemon: &str,
    default: &str,
) -> Result<Vec<String>> {
    let mut listed: Vec<&str> = vec![default];
    listed.extend(REPORT_PLUGINS.iter().copied().filter(|name| *name != default));
    p.list(
        &format!(
            "Enter the plugins to be loaded by the {} (the first one is the default)\n[{}] [{}]: ",
            daemon,
            listed.join(", "),
            default
        ),
        &format!("Enter valid plugin names [{}]: ", default),
        Some(default),
        valid_plugins,
    )
}

fn ask_port<R: BufRead, W: Write>(p: &mut Prompter<R, W>, what: &str, default: u64) -> Result<u64> {
    p.number_in(
        &format!("Enter the {} port number that will be used by the EARDBD", what),
        "Enter a valid number",
        Some(default),
        1..=u16::MAX as u64,
    )
}

/// Ask the relational database questions
pub fn ask_database<R: BufRead, W: Write>(p: &mut Prompter<R, W>) -> Result<DatabaseConfig> {
    p.banner("DB configuration")?;
    p.say("This configuration corresponds with the DB server installation.")?;

    let defaults = DatabaseConfig::default();
    if !p.yes_no(
        "Do you want to use a relational database plugin like mysql or postgres",
        Some(true),
    )? {
        p.say("The relational database plugin is configured with default values")?;
        return Ok(defaults);
    }

    let ip = p.ask_until(
        &format!("Enter the IP address of the Database server [{}]: ", defaults.ip),
        &format!("Enter a valid IP address [{}]: ", defaults.ip),
        |answer| {
            let answer = answer.trim();
            if answer.is_empty() {
                Some(defaults.ip.clone())
            } else {
                answer.parse::<Ipv4Addr>().ok().map(|ip| ip.to_string())
            }
        },
    )?;
    let port = p.number_in(
        "Enter the port of the Database server",
        "Enter a valid port",
        Some(defaults.port),
        1..=u16::MAX as u64,
    )?;
    let max_connections = p.number_in(
        "Enter the maximum number of connections to the database",
        "Enter a valid number",
        None,
        1..=u32::MAX as u64,
    )?;
    let database = p.text(
        "Enter the name of the Database",
        "Enter a valid name",
        Some(defaults.database.as_str()),
    )?;
    let user = p.text(
        "Enter the username of the Database server",
        "Enter a valid username",
        Some(defaults.user.as_str()),
    )?;
    let password = p.ask_until(
        "Enter the password of the Database server [password]: ",
        "Enter the password of the Database server [password]: ",
        |answer| {
            let answer = answer.trim();
            Some(if answer.is_empty() { "password" } else { answer }.to_string())
        },
    )?;

    let (commands_user, commands_password) = if p.yes_no(
        "Do you want a specific user for read-only access to the database",
        Some(true),
    )? {
        let name = p.text("Enter the username", "Enter a valid username", Some(defaults.commands_user.as_str()))?;
        let secret = p.ask_until("Enter the password [password]: ", "Enter the password [password]: ", |answer| {
            let answer = answer.trim();
            Some(if answer.is_empty() { "password" } else { answer }.to_string())
        })?;
        (name, secret)
    } else {
        (String::new(), String::new())
    };

    Ok(DatabaseConfig {
        ip,
        port,
        max_connections,
        database,
        user,
        password,
        commands_user,
        commands_password,
        report_node_detail: p.yes_no("Do you want to save the extended node information", Some(true))?,
        report_sig_detail: p.yes_no("Do you want to save the extended signature information", Some(true))?,
        report_loops: p.yes_no("Do you want to save application runtime metrics", Some(true))?,
    })
}

/// Ask the node daemon questions
pub fn ask_node_daemon<R: BufRead, W: Write>(p: &mut Prompter<R, W>) -> Result<NodeDaemonConfig> {
    p.banner("EAR Daemon (EARD) configuration")?;
    Ok(NodeDaemonConfig {
        port: p.number_in(
            "Enter the port number that will be used to connect with the EAR plugin and commands",
            "Enter a valid number",
            Some(DEFAULT_EARD_PORT as u64),
            1..=u16::MAX as u64,
        )?,
        powermon_freq: p.number(
            "Enter the frequency at which the periodic metrics are reported, in seconds",
            "Enter a valid number",
            Some(60),
        )?,
        use_db: p.yes_no("Do you want the EARD to use the database", Some(true))?,
        use_log: p.yes_no("Should the EARD use a log file?", Some(true))?,
        report_plugins: ask_plugins(p, "EARD", "eardbd.so")?,
    })
}

/// Ask the database manager questions
pub fn ask_db_manager<R: BufRead, W: Write>(
    p: &mut Prompter<R, W>,
    cluster: &ClusterModel,
) -> Result<DbManagerConfig> {
    p.banner("EAR Database Manager (EARDBD) configuration")?;

    let kind = p.choice(
        "Should the EARDBD be global for all types/partitions or configured per type/partition\n[global/per-type]: ",
        "Enter a valid value [global/per-type]: ",
        &["global", "per-type"],
        None,
    )?;

    let placement = if kind == "global" {
        let host = p.text(
            "On which node should the service be hosted? Enter the hostname",
            "Enter a valid hostname",
            None,
        )?;
        DbManagerPlacement::Global { host }
    } else {
        let options = cluster
            .types
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let mut hosts: Vec<(String, String)> = Vec::new();
        loop {
            let taken: Vec<String> = hosts.iter().map(|(t, _)| t.clone()).collect();
            let type_name = p.ask_until(
                &format!("Enter the partition type [{}]: ", options),
                &format!("Enter a valid partition type [{}]: ", options),
                |answer| {
                    let answer = answer.trim();
                    cluster
                        .position(answer)
                        .filter(|_| !taken.iter().any(|t| t == answer))
                        .map(|_| answer.to_string())
                },
            )?;
            let host = p.text("Enter the hostname", "Enter a valid hostname", None)?;
            hosts.push((type_name, host));

            if hosts.len() == cluster.types.len()
                || !p.yes_no("Do you want to add more types", Some(false))?
            {
                break;
            }
        }
        DbManagerPlacement::PerType { hosts }
    };

    let mirror = if p.yes_no(
        "Do you want to set up the mirror DB service on a different server",
        Some(false),
    )? {
        Some(p.text("Enter the hostname", "Enter a valid hostname", None)?)
    } else {
        None
    };

    let tcp_port = ask_port(p, "TCP", 50002)?;
    let sec_tcp_port = ask_port(p, "SecTCP", 50003)?;
    let sync_port = ask_port(p, "Sync", 50004)?;

    Ok(DbManagerConfig {
        placement,
        mirror,
        tcp_port,
        sec_tcp_port,
        sync_port,
        aggregation_time: p.number(
            "Enter the frequency at which the power metrics are aggregated, in seconds",
            "Enter a valid number",
            Some(60),
        )?,
        insertion_time: p.number(
            "Enter the frequency at which the buffered data is sent to the DB server, in seconds",
            "Enter a valid number",
            Some(30),
        )?,
        use_log: p.yes_no("Should the EARDBD use a log file?", Some(true))?,
        report_plugins: ask_plugins(p, "EARDBD", "mysql.so")?,
    })
}

/// Ask all daemon sections in file order
pub fn ask_daemons<R: BufRead, W: Write>(
    p: &mut Prompter<R, W>,
    cluster: &ClusterModel,
) -> Result<DaemonsConfig> {
    Ok(DaemonsConfig {
        database: ask_database(p)?,
        node: ask_node_daemon(p)?,
        db_manager: ask_db_manager(p, cluster)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::model::NodeType;
    use std::io::Cursor;

    fn prompter(input: &str) -> Prompter<Cursor<Vec<u8>>, Vec<u8>> {
        Prompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    fn cluster() -> ClusterModel {
        ClusterModel {
            types: ["cpu", "gpu"]
                .iter()
                .map(|n| NodeType {
                    name: n.to_string(),
                    nodes: 4,
                    max_power: 500,
                    avg_power: 250,
                })
                .collect(),
        }
    }

    #[test]
    fn test_database_declined_uses_defaults() {
        let mut p = prompter("n\n");
        let db = ask_database(&mut p).unwrap();
        assert_eq!(db, DatabaseConfig::default());
        assert_eq!(db.max_connections, 20);
    }

    #[test]
    fn test_database_answers() {
        let input = "y\n10.0.0\n10.0.0.5\n\n50\n\n\n\nn\n\nn\n\n";
        let mut p = prompter(input);
        let db = ask_database(&mut p).unwrap();
        assert_eq!(db.ip, "10.0.0.5");
        assert_eq!(db.port, 3306);
        assert_eq!(db.max_connections, 50);
        assert_eq!(db.database, "EAR");
        assert_eq!(db.password, "password");
        assert!(db.commands_user.is_empty());
        assert!(db.report_node_detail);
        assert!(!db.report_sig_detail);
        assert!(db.report_loops);
    }

    #[test]
    fn test_node_daemon_plugins_validated() {
        let mut p = prompter("\n\n\nn\nfoo.so\ncsv.so, eard.so\n");
        let eard = ask_node_daemon(&mut p).unwrap();
        assert_eq!(eard.port, 50001);
        assert_eq!(eard.powermon_freq, 60);
        assert!(!eard.use_log);
        assert_eq!(eard.report_plugins, vec!["csv.so", "eard.so"]);
    }

    #[test]
    fn test_db_manager_per_type() {
        let input = "per-type\nxyz\ncpu\ndb1\ny\ncpu\ngpu\ndb2\n\n\n\n\n\n\n\n";
        let mut p = prompter(input);
        let dbd = ask_db_manager(&mut p, &cluster()).unwrap();
        assert_eq!(
            dbd.placement,
            DbManagerPlacement::PerType {
                hosts: vec![
                    ("cpu".to_string(), "db1".to_string()),
                    ("gpu".to_string(), "db2".to_string())
                ]
            }
        );
        assert_eq!(dbd.mirror, None);
        assert_eq!(dbd.tcp_port, 50002);
        assert_eq!(dbd.sync_port, 50004);
        assert_eq!(dbd.insertion_time, 30);
        assert_eq!(dbd.report_plugins, vec!["mysql.so"]);
    }

    #[test]
    fn test_valid_plugins() {
        assert!(valid_plugins(&["mysql.so".to_string()]));
        assert!(!valid_plugins(&[]));
        assert!(!valid_plugins(&["mysql.so".to_string(), "x.so".to_string()]));
    }
}
