use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use tidekv_common::{ClientId, ConnectionError, INITIAL_BUFFER_CAPACITY, OUTBOX_CAPACITY};

use crate::event_loop::Event;

/// Aceita conexões e reporta leituras e fechamentos ao event loop.
///
/// Cada conexão ganha uma task de leitura e uma de escrita; nenhuma delas
/// toca o store.
pub async fn serve(
    listener: TcpListener,
    max_connections: usize,
    events: mpsc::Sender<Event>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let semaphore = Arc::new(Semaphore::new(max_connections));
    let mut next_id = 0u64;

    loop {
        if semaphore.available_permits() == 0 {
            warn!(max_connections, "limite de conexões atingido, aguardando");
        }
        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = shutdown.recv() => break,
        };

        let (socket, addr) = tokio::select! {
            result = listener.accept() => match result {
                Ok(v) => v,
                Err(e) => {
                    error!("erro ao aceitar conexão: {e}");
                    continue;
                }
            },
            _ = shutdown.recv() => break,
        };

        next_id += 1;
        let id = ClientId(next_id);
        info!(client = %id, %addr, "nova conexão");

        if spawn_connection(socket, id, events.clone(), permit, shutdown.resubscribe())
            .await
            .is_err()
        {
            break;
        }
    }

    info!("acceptor encerrado");
}

async fn spawn_connection(
    socket: TcpStream,
    id: ClientId,
    events: mpsc::Sender<Event>,
    permit: OwnedSemaphorePermit,
    shutdown: broadcast::Receiver<()>,
) -> Result<(), ConnectionError> {
    let (reader, writer) = socket.into_split();
    let (outbox, rx) = mpsc::channel(OUTBOX_CAPACITY);
    // a escrita termina quando o event loop descarta o cliente; a leitura vai junto
    let (writer_done, writer_gone) = oneshot::channel::<()>();

    events
        .send(Event::Connected { id, outbox })
        .await
        .map_err(|_| ConnectionError::Shutdown)?;

    tokio::spawn(async move {
        if let Err(e) = write_loop(writer, rx).await {
            debug!(client = %id, "escrita interrompida: {e}");
        }
        drop(writer_done);
    });

    tokio::spawn(async move {
        if let Err(e) = read_loop(reader, id, &events, shutdown, writer_gone).await {
            debug!(client = %id, "leitura interrompida: {e}");
        }
        let _ = events.send(Event::Closed { id }).await;
        drop(permit);
    });

    Ok(())
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    id: ClientId,
    events: &mpsc::Sender<Event>,
    mut shutdown: broadcast::Receiver<()>,
    mut writer_gone: oneshot::Receiver<()>,
) -> Result<(), ConnectionError> {
    let mut buffer = BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY);

    loop {
        buffer.reserve(INITIAL_BUFFER_CAPACITY);
        let n = tokio::select! {
            result = reader.read_buf(&mut buffer) => match result {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                    return Err(ConnectionError::ConnectionReset);
                }
                Err(e) => return Err(e.into()),
            },
            _ = shutdown.recv() => return Err(ConnectionError::Shutdown),
            _ = &mut writer_gone => return Ok(()),
        };
        if n == 0 {
            return Ok(());
        }

        let data = buffer.split().freeze();
        events
            .send(Event::Readable { id, data })
            .await
            .map_err(|_| ConnectionError::Shutdown)?;
    }
}

// Termina quando o event loop solta a outra ponta do canal.
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Bytes>,
) -> Result<(), ConnectionError> {
    while let Some(bytes) = rx.recv().await {
        writer.write_all(&bytes).await?;
    }
    Ok(())
}
