//!
//! skillbill admin binary
//! ----------------------
//! Opens the configured ledger directory, runs one command against it, and writes
//! the snapshot back. Output is JSON on stdout; failures are printed as
//! `{"code": ..., "message": ...}` on stderr.

use std::env;

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use skillbill::config::LedgerConfig;
use skillbill::security::seed_defaults;
use skillbill::{AccessLevel, AppError, CredentialValidator, Invocation, MemoryStore, PermissionEvaluator};

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} <command> [args]\n\nCommands:\n  seed                                         install default roles, features and grants\n  roles                                        list roles\n  features                                     list features\n  grants <roleid>[,<roleid>...]                list grants held by the given roles\n  users                                        list users\n  assign <roleid> <featureid> <0|1>            grant ReadOnly (0) or ReadWrite (1)\n  remove <roleid> <featureid>                  remove every grant of a feature from a role\n  register <cert.pem> <adlogin> <roleid> <password>\n                                               register a user bound to the certificate key\n  login <cert.pem> [password]                  authenticate as the certificate holder\n  check <cert.pem> <featureid> <0|1>           check the certificate holder's permission\n\nEnvironment:\n  SKILLBILL_DATA_DIR (default: ledger), SKILLBILL_SNAPSHOT, SKILLBILL_SNAPSHOT_INTERVAL_MS, SKILLBILL_MSPID (default: Org1MSP), RUST_LOG"
    );
}

fn main() {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("skillbill");
    if args.len() < 2 || matches!(args[1].as_str(), "-h" | "--help" | "help") {
        print_usage(program);
        std::process::exit(if args.len() < 2 { 2 } else { 0 });
    }

    match run(&args[1], &args[2..]) {
        Ok(out) => println!("{}", serde_json::to_string_pretty(&out).unwrap_or_else(|_| out.to_string())),
        Err(e) => {
            match e.downcast_ref::<AppError>() {
                Some(app) => eprintln!("{}", app.to_response_json()),
                None => eprintln!("{}", json!({"code": "INTERNAL", "message": format!("{e:#}")})),
            }
            std::process::exit(1);
        }
    }
}

fn run(command: &str, args: &[String]) -> Result<Value> {
    let cfg = LedgerConfig::from_env();
    let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "skillbill",
        "skillbill starting: RUST_LOG='{}', data_dir='{}', snapshot={:?}, snapshot_interval_ms={:?}, mspid={}",
        rust_log, cfg.data_dir.display(), cfg.snapshot, cfg.snapshot_interval_ms, cfg.mspid
    );
    let store = cfg.open_store().with_context(|| format!("opening ledger at {}", cfg.data_dir.display()))?;
    let out = dispatch(&cfg, &store, command, args);
    store.shutdown();
    let out = out?;
    store.save_snapshot()?;
    Ok(out)
}

fn arg<'a>(args: &'a [String], i: usize, name: &str) -> Result<&'a str> {
    args.get(i).map(String::as_str).ok_or_else(|| anyhow!("missing argument <{name}>"))
}

fn invocation<'a>(cfg: &LedgerConfig, store: &'a MemoryStore, cert_path: &str) -> Result<Invocation<'a>> {
    let pem = std::fs::read(cert_path).with_context(|| format!("reading certificate {cert_path}"))?;
    Ok(Invocation::with_certificate(store, &cfg.mspid, pem))
}

fn dispatch(cfg: &LedgerConfig, store: &MemoryStore, command: &str, args: &[String]) -> Result<Value> {
    let perms = PermissionEvaluator::new();
    let creds = CredentialValidator::new();
    let out = match command {
        "seed" => json!({ "installed": seed_defaults(store)? }),
        "roles" => serde_json::to_value(perms.get_roles(store)?)?,
        "features" => serde_json::to_value(perms.get_features(store)?)?,
        "grants" => {
            let ids: Vec<&str> = arg(args, 0, "roleid")?.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
            serde_json::to_value(perms.features_by_role_ids(store, &ids)?)?
        }
        "users" => {
            let users = creds.get_all_users(store)?;
            // hashes stay on the ledger
            let listed: Vec<Value> = users
                .iter()
                .map(|u| json!({ "adlogin": u.ad_login, "roleid": u.role_id, "publickey": u.public_key }))
                .collect();
            Value::Array(listed)
        }
        "assign" => {
            let level: AccessLevel = arg(args, 2, "level")?.parse()?;
            serde_json::to_value(perms.assign_feature_role(store, arg(args, 0, "roleid")?, arg(args, 1, "featureid")?, level)?)?
        }
        "remove" => json!({ "removed": perms.remove_feature_from_role(store, arg(args, 0, "roleid")?, arg(args, 1, "featureid")?)? }),
        "register" => {
            let inv = invocation(cfg, store, arg(args, 0, "cert.pem")?)?;
            let login = creds.register_user(&inv, arg(args, 1, "adlogin")?, arg(args, 2, "roleid")?, arg(args, 3, "password")?)?;
            json!({ "adlogin": login })
        }
        "login" => {
            let inv = invocation(cfg, store, arg(args, 0, "cert.pem")?)?;
            serde_json::to_value(creds.authenticate(&inv, args.get(1).map(String::as_str))?)?
        }
        "check" => {
            let inv = invocation(cfg, store, arg(args, 0, "cert.pem")?)?;
            let level: AccessLevel = arg(args, 2, "level")?.parse()?;
            json!({ "granted": perms.check_user_permission(&inv, arg(args, 1, "featureid")?, level)? })
        }
        other => return Err(anyhow!("unknown command '{other}'")),
    };
    Ok(out)
}
