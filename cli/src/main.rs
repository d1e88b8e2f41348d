#[macro_use] extern crate clap;

use clap::{App, ArgMatches};
use env_logger::{from_env, Env};
use minibox::{errors::SandboxError, registry::Client, Container};
use std::env;

#[tokio::main]
async fn main() {
    from_env(Env::default().default_filter_or("warn")).init();

    let yaml = load_yaml!("cli.yml");
    let matches = App::from_yaml(yaml)
        .version(crate_version!())
        .get_matches();

    let code = match matches.subcommand() {
        ("run", Some(run_matches)) => run(run_matches).await,
        _ => 1,
    };
    std::process::exit(code);
}

async fn run(matches: &ArgMatches<'_>) -> i32 {
    let image_reference = matches.value_of("image_reference").unwrap();
    let command = matches.value_of("command").unwrap();
    let run_args = string_values(matches, "run_args");

    if offline() {
        log::info!("offline, not fetching a manifest for {}", image_reference);
    } else if let Err(err) = fetch_manifest(image_reference).await {
        log::error!("{}", err);
        return 1;
    }

    let container = Container::new(command)
        .args(run_args)
        .chroot(!matches.is_present("no_chroot"))
        .pid_namespace(!matches.is_present("no_pid_namespace"));
    let container = match container.spawn().await {
        Ok(container) => container,
        Err(err) => {
            report(&err);
            return 1;
        }
    };

    match container.interact().await {
        Ok(status) => status.code(),
        Err(err) => {
            report(&err);
            1
        }
    }
}

async fn fetch_manifest(image_reference: &str) -> Result<(), minibox::errors::RegistryError> {
    let mut client = Client::builder();
    if let Ok(url) = env::var("MINIBOX_AUTH_URL") {
        client = client.auth_url(url);
    }
    if let Ok(url) = env::var("MINIBOX_REGISTRY") {
        client = client.registry(url);
    }
    let manifest = client.build()?.pull_manifest(image_reference).await?;
    log::info!("{:?}", manifest);
    Ok(())
}

fn offline() -> bool {
    env::var_os("MINIBOX_OFFLINE").map_or(false, |value| !value.is_empty())
}

fn report(err: &SandboxError) {
    log::error!("{}", err);
    if err.requires_privilege() {
        log::error!("must run as a privileged user (chroot and PID namespaces need root)");
    }
}

fn string_values<S: AsRef<str>>(matches: &ArgMatches, name: S) -> Vec<String> {
    matches
        .values_of(name)
        .into_iter()
        .map(|values| values.map(|value| value.to_string()))
        .flatten()
        .collect()
}
