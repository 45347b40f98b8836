use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::{debug, info};
use reqwest::Client;
use stravaweather::config::{DEFAULT_TABLE_NAME, SecretString};
use stravaweather::darksky::DarkSkyClient;
use stravaweather::dynamo::DynamoStore;
use stravaweather::models::{ActivityId, UserSettings, WeatherUnits};
use stravaweather::set_up_logger;
use stravaweather::strava::StravaClient;
use stravaweather::weather::description_with_weather;

#[derive(Debug)]
struct Args {
    verbose: bool,
    token: Option<SecretString>,
    darksky_key: Option<SecretString>,
    activity: Option<ActivityId>,
    units: WeatherUnits,
    init_table: Option<String>,
}

fn command() -> Command {
    Command::new("stravaweather")
        .version("0.1")
        .author("Jacob Luszcz")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Verbose mode. Outputs DEBUG and higher log messages."),
        )
        .arg(
            Arg::new("token")
                .short('t')
                .long("token")
                .env("STRAVA_TOKEN")
                .hide_env_values(true)
                .help("Strava access token for the activity's athlete."),
        )
        .arg(
            Arg::new("darksky-key")
                .long("darksky-key")
                .env("DARK_SKY_API_KEY")
                .hide_env_values(true)
                .help("DarkSky API key."),
        )
        .arg(
            Arg::new("activity")
                .short('a')
                .long("activity")
                .value_parser(clap::value_parser!(u64))
                .help("Print the weather description for this activity, without posting it."),
        )
        .arg(
            Arg::new("units")
                .short('u')
                .long("units")
                .value_parser(["both", "imperial", "metric"])
                .default_value("both")
                .help("Units used in the description."),
        )
        .arg(
            Arg::new("init-table")
                .long("init-table")
                .num_args(0..=1)
                .default_missing_value(DEFAULT_TABLE_NAME)
                .help("Create the DynamoDB table if it does not exist."),
        )
}

fn args_from(matches: &ArgMatches) -> Args {
    let verbose = matches.get_flag("verbose");
    let token = matches
        .get_one::<String>("token")
        .map(|token| SecretString::new(token.as_str()));
    let darksky_key = matches
        .get_one::<String>("darksky-key")
        .map(|key| SecretString::new(key.as_str()));
    let activity = matches.get_one::<u64>("activity").copied();
    let units = match matches.get_one::<String>("units").map(String::as_str) {
        Some("imperial") => WeatherUnits::Imperial,
        Some("metric") => WeatherUnits::Metric,
        _ => WeatherUnits::Both,
    };
    let init_table = matches.get_one::<String>("init-table").cloned();

    Args {
        verbose,
        token,
        darksky_key,
        activity,
        units,
        init_table,
    }
}

fn parse_args() -> Args {
    args_from(&command().get_matches())
}

async fn print_description(args: &Args, activity_id: ActivityId) -> Result<()> {
    let token = args
        .token
        .as_ref()
        .context("--token or STRAVA_TOKEN is required")?;
    let darksky_key = args
        .darksky_key
        .clone()
        .context("--darksky-key or DARK_SKY_API_KEY is required")?;

    let client = Client::new();
    // Reading an activity only needs the athlete's token
    let strava = StravaClient::new(client.clone(), String::new(), SecretString::new(""));
    let darksky = DarkSkyClient::new(client, darksky_key);

    let activity = strava.activity(token.expose(), activity_id).await?.value;
    debug!("{activity:?}");

    let (latitude, longitude) = activity
        .start_location()
        .with_context(|| format!("Activity {activity_id} has no start location"))?;
    let weather = darksky
        .weather_snapshot(latitude, longitude, activity.start_date)
        .await?
        .value
        .with_context(|| format!("No weather available for activity {activity_id}"))?;
    debug!("{weather:?}");

    let settings = UserSettings {
        weather_units: args.units,
        ..UserSettings::default()
    };
    println!(
        "{}",
        description_with_weather(activity.description.as_deref(), &weather, &settings)
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();
    set_up_logger(module_path!(), args.verbose)?;
    debug!("{args:?}");

    if let Some(table_name) = &args.init_table {
        let store = DynamoStore::from_env(table_name.as_str()).await;
        store.ensure_table().await?;
        info!("Table {table_name} is ready");
    }

    if let Some(activity_id) = args.activity {
        print_description(&args, activity_id).await?;
    }

    Ok(())
}
