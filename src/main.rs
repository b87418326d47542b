use std::collections::HashMap;
use std::fs::File;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::{env, thread};

use bloomfilter::Bloom;
use log::{debug, error, info, warn};

use screen_booking::attachment::InMemoryAttachments;
use screen_booking::booking::{Booking, BookingId, BookingOutput};
use screen_booking::booking_store::BookingStore;
use screen_booking::config::Settings;
use screen_booking::error::Error;
use screen_booking::gateway::SimulatedGateway;
use screen_booking::payment::PaymentGatewayAdapter;
use screen_booking::screen::{Screen, ScreenCatalog};
use screen_booking::{Command, CommandRow, Services};

const WORKER_COUNT: usize = 4;
// Create rows only; ~1M bookings at this rate keeps the filter around 3MB
const EXPECTED_N_BOOKINGS: usize = 1_000_000;
const BLOOM_FP_RATE: f64 = 0.00001;

// Each worker owns the bookings routed to it, which makes it the single writer
// for those records.
fn worker_loop(rx: Receiver<CommandRow>, services: Services) -> HashMap<BookingId, Booking> {
    let mut bookings: HashMap<BookingId, Booking> = HashMap::new();

    // Blocks until message or channel closed (sender dropped)
    while let Ok(row) = rx.recv() {
        let booking = row.booking();
        let command: Command = match row.try_into() {
            Ok(command) => command,
            Err(e) => {
                error!("Failed to convert command: {}", e);
                continue;
            }
        };

        debug!("Processing: {:?}", command);

        if let Err(e) = command.process(&mut bookings, &services) {
            error!("Command on booking {} failed ({:?}): {}", booking, e.kind(), e);
        }
    }

    bookings
}

fn load_screens(path: &str) -> Result<ScreenCatalog, Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(File::open(path)?);

    let mut catalog = ScreenCatalog::new();
    for result in rdr.deserialize() {
        let screen: Screen = match result {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to parse screen row: {}", e);
                continue;
            }
        };
        catalog.insert(screen);
    }
    Ok(catalog)
}

fn main() -> Result<(), Error> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let screens_path = args.next().ok_or(Error::MissingArgument)?;
    let commands_path = args.next().ok_or(Error::MissingArgument)?;

    let settings = Settings::from_env()?;
    let screens = load_screens(&screens_path)?;
    info!(
        "Loaded {} screens; settling in {} at {} per {}",
        screens.len(),
        settings.settlement_currency,
        settings.exchange_rate,
        settings.local_currency
    );

    let gateway = Arc::new(SimulatedGateway::new(settings.approval_url.clone()));
    let services = Services {
        screens: Arc::new(screens),
        payments: PaymentGatewayAdapter::new(gateway, settings),
        attachments: Arc::new(InMemoryAttachments::new()),
    };

    info!("Processing commands from: {}", commands_path);
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(File::open(&commands_path)?);

    let mut bloom = Bloom::new_for_fp_rate(EXPECTED_N_BOOKINGS, BLOOM_FP_RATE).unwrap();

    let (senders, receivers): (Vec<_>, Vec<_>) = (0..WORKER_COUNT)
        .map(|_| mpsc::channel::<CommandRow>())
        .unzip();

    let handles: Vec<_> = receivers
        .into_iter()
        .map(|rx| {
            let services = services.clone();
            thread::spawn(move || worker_loop(rx, services))
        })
        .collect();

    for result in rdr.deserialize() {
        let row: CommandRow = match result {
            Ok(r) => r,
            Err(e) => {
                error!("Failed to parse command row: {}", e);
                continue;
            }
        };

        // The filter can report false positives, so a suspected replay is only
        // flagged; the store refuses a real duplicate id
        if row.should_dedupe() && bloom.check_and_set(&row.booking()) {
            warn!(
                "Possible replayed {} booking={} actor={} (may be a false positive)",
                row.action(),
                row.booking(),
                row.actor()
            );
        }

        let worker_idx = row.booking() as usize % WORKER_COUNT;
        {
            let sender = &senders[worker_idx];
            if let Err(e) = sender.send(row) {
                error!("Failed to send command to worker {}: {}", worker_idx, e);
            }
        }
    }

    // Explicit drop to avoid another closure and a dedicated thread
    drop(senders);

    let bookings: HashMap<BookingId, Booking> = handles
        .into_iter()
        .filter_map(|h| match h.join() {
            Ok(shard) => Some(shard),
            Err(_) => {
                error!("Worker thread panicked");
                None
            }
        })
        .fold(HashMap::new(), |mut merged, shard| {
            merged.extend(shard);
            merged
        });

    let live = bookings.live();
    info!("Processing complete. {} live bookings.", live.len());

    let mut wtr = csv::Writer::from_writer(std::io::stdout());
    for booking in live {
        wtr.serialize(BookingOutput::from(booking.clone()))?;
    }
    wtr.flush()?;

    Ok(())
}
