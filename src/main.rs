#[macro_use]
extern crate log;

use anyhow::Result;
use squawk_rs::{
    config::{self, Config},
    event::{self, Event, EventBus},
    host, net, pipeline,
    pipeline::Pipeline,
    stdin,
    text_source::TextSources,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init();

    let config = match config::load().await {
        Ok(config) => config,
        Err(e) => {
            warn!("{e:?}");
            info!("Falling back to default config.");
            Config::default()
        }
    };

    let bus = EventBus::new();
    event::debug(&bus);

    let sources = TextSources::new();
    let pipeline = Pipeline::create(&config, Arc::new(sources.clone()))?;

    let host_output = host::init(pipeline.bridge());
    net::init(config.output.listen_addr.clone(), host_output);

    let mut pipeline_task = pipeline::init(&bus, pipeline);
    stdin::init(bus.clone(), sources);

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            bus.send(Event::Shutdown);
            pipeline_task.await?;
        }
        result = &mut pipeline_task => result?,
    }

    info!("Bye");

    Ok(())
}
