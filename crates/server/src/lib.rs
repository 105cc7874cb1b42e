#![forbid(unsafe_code)]

mod connection;
mod dispatcher;
mod event_loop;
mod net;

pub use connection::{Connection, State};
pub use dispatcher::{Dispatcher, Execution, Outcome};
pub use event_loop::{Event, EventLoop};

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use tidekv_common::EVENT_QUEUE_CAPACITY;

/// Serve clientes em `listener` até o sinal de shutdown.
///
/// O acceptor e as tasks de socket só movem bytes; todo o estado vive no
/// event loop, que roda na task atual.
pub async fn run(
    listener: TcpListener,
    max_connections: usize,
    shutdown: broadcast::Receiver<()>,
) {
    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let acceptor = tokio::spawn(net::serve(
        listener,
        max_connections,
        events_tx,
        shutdown.resubscribe(),
    ));

    EventLoop::new(events_rx).run(shutdown).await;
    let _ = acceptor.await;
}
