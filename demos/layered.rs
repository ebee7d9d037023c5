use dragon_conf::config::{functions, system, CliSource, FileSource, MapSource, SystemPropertySource};
use dragon_conf::mutable::{MutableConfiguration, MutableMapSource};
use dragon_conf::Configuration;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct AppConfig {
    app: AppSection,
    database: DatabaseSection,
}

#[derive(Debug, Deserialize)]
struct AppSection {
    name: String,
    debug: bool,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct DatabaseSection {
    host: String,
    port: u16,
    name: String,
    url: String,
}

fn main() -> Result<(), dragon_conf::Error> {
    system::set_property("database.host", "db.internal");

    let config = Configuration::builder()
        .add_source(MapSource::new("built-in", [("app.name", "unnamed")]).with_ordinal(-10))
        .add_source(FileSource::new("demos/default.toml", true)?)
        .add_source(FileSource::new("demos/dev.properties", false)?.with_ordinal(150))
        .add_source(CliSource::new(std::env::args().skip(1)))
        .add_source(SystemPropertySource::new())
        .add_source(MutableMapSource::new("runtime").with_ordinal(20_000))
        .add_default_filters()
        .build()?;

    let typed: AppConfig = config.deserialize()?;
    println!("App: {} (debug={})", typed.app.name, typed.app.debug);
    println!("Database URL: {}", typed.database.url);

    let port: u16 = config.get_as_or("database.port", 5432)?;
    println!("Database port: {port}");

    let database = config.with(functions::section("database", true))?;
    for (key, value) in database.properties()? {
        println!("  database.{key} = {value}");
    }

    let mutable = MutableConfiguration::new(config.clone());
    mutable.start_transaction()?;
    mutable.put("app.debug", "false")?;
    mutable.commit()?;
    println!("debug after commit: {:?}", config.get_as::<bool>("app.debug")?);

    Ok(())
}
