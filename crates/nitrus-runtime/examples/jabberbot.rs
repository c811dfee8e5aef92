//! An XMPP echo bot on the cooperative runtime.
//!
//! Connects, authenticates (registering the account in-band if the server
//! rejects it), auto-accepts subscriptions, logs presence changes, and
//! answers every chat message with a canned reply.
//!
//! Run with:
//! `cargo run --example jabberbot -- --server example.com --port 5222 \
//!    --username bot --password secret`

use std::cell::RefCell;
use std::rc::Rc;

use nitrus_core::jabber::{Session, SessionEvent, KEEP_ALIVE_INTERVAL};
use nitrus_runtime::net::{Read, Stream, POLL_INTERVAL};
use nitrus_runtime::params::Params;
use nitrus_runtime::Scheduler;

type Shared = Rc<RefCell<(Stream, Session)>>;

fn main() -> nitrus_runtime::Result<()> {
    tracing_subscriber::fmt::init();

    let params = Params::from_env();
    let server = params.get_or("--server", "localhost");
    let port: u16 = params.get_parsed("--port", 5222);
    let username = params.get_or("--username", "bot");
    let password = params.get_or("--password", "secret");

    let stream = Stream::connect((server.as_str(), port))?;
    let mut session = Session::new(&username, &password, &server);
    session.connect()?;
    session.connected()?;

    let shared: Shared = Rc::new(RefCell::new((stream, session)));
    let mut scheduler = Scheduler::new();
    let seed = Rc::clone(&shared);
    scheduler.invoke(move |scheduler| pump(scheduler, seed));
    scheduler.run();
    Ok(())
}

fn pump(scheduler: &mut Scheduler, shared: Shared) {
    let established_before;
    {
        let (stream, session) = &mut *shared.borrow_mut();
        established_before = session.established();

        let mut buffer = [0u8; 4096];
        loop {
            match stream.poll_read(&mut buffer) {
                Ok(Read::Data(count)) => {
                    let events = match session.receive(&buffer[..count]) {
                        Ok(events) => events,
                        Err(err) => {
                            tracing::error!(%err, "dropping connection");
                            stream.disconnect();
                            return;
                        }
                    };
                    for event in events {
                        handle(session, event);
                    }
                }
                Ok(Read::WouldBlock) => break,
                Ok(Read::Closed) | Err(_) => {
                    let _ = session.disconnected();
                    tracing::info!("disconnected");
                    return;
                }
            }
        }

        let output = session.take_output();
        if !output.is_empty() {
            if let Err(err) = stream.send(&output) {
                tracing::error!(%err, "send failed");
                return;
            }
        }
    }

    if !established_before && shared.borrow().1.established() {
        schedule_keep_alive(scheduler, Rc::clone(&shared));
    }
    scheduler.set_timeout(POLL_INTERVAL, move |scheduler| pump(scheduler, shared));
}

fn handle(session: &mut Session, event: SessionEvent) {
    match event {
        SessionEvent::Established => {
            tracing::info!(jid = %session.jid(), "session established");
        }
        SessionEvent::PresenceReceived { from, show } => {
            tracing::info!(%from, %show, "presence");
        }
        SessionEvent::MessageReceived { from, body } => {
            tracing::info!(%from, %body, "message");
            session.message(&from, "hey, I am a jabber bot.");
        }
        SessionEvent::Disconnected => {
            tracing::info!("disconnected");
        }
    }
}

fn schedule_keep_alive(scheduler: &mut Scheduler, shared: Shared) {
    scheduler.set_timeout(KEEP_ALIVE_INTERVAL, move |scheduler| {
        let healthy = {
            let (stream, session) = &mut *shared.borrow_mut();
            session.keep_alive();
            let output = session.take_output();
            stream.send(&output).is_ok()
        };
        if healthy {
            schedule_keep_alive(scheduler, shared);
        }
    });
}
