//! Two views of the same counter staying in sync, then a clear.

use stowage::storage::MemoryStore;
use stowage::Hub;

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stowage=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}

fn main() {
    init_logging();

    let hub = Hub::new(MemoryStore::new());
    let header = hub.number("clicks", Some(0.0));
    let footer = hub.number("clicks", Some(0.0));

    let _watch = footer.watch(|value| {
        println!("footer sees {value:?}");
    });

    for _ in 0..3 {
        header.update(|n| *n = Some(n.unwrap_or(0.0) + 1.0));
    }
    println!("header = {:?}, footer = {:?}", header.get(), footer.get());

    footer.reset();
    println!("after reset: header = {:?}", header.get());

    header.set_value(7.0);
    let notified = hub.clear();
    println!("clear notified {notified} synchronizers; header = {:?}", header.get());
}
