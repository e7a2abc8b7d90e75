// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

//! Multi-destination request dispatch: the same marshalled packet is sent to
//! every configured server, bounded by a maximum number of in-flight
//! connections, a per-connection timeout and a wall-clock deadline over the
//! whole operation.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, warn};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::packet::Packet;

#[derive(Debug, Clone)]
pub struct RequestParams {
    pub marshalled_packet: Vec<u8>,
    /// Maximum number of concurrently open connections.
    pub max_requests: usize,
    /// Deadline for dialing a single server and exchanging the packets.
    pub connect_timeout: Duration,
    /// Wall-clock deadline over the entire fan-out; when it fires all
    /// in-flight work is cancelled and whatever arrived so far is returned.
    pub request_timeout: Duration,
    pub server_addresses: Vec<String>,
}

/// A raw response tagged with the address it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerResponse {
    pub marshalled_data: Vec<u8>,
    pub address: String,
}

async fn exchange_packet(address: &str, packet_bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(address).await?;

    let packet = Packet::new(packet_bytes[4..].to_vec());
    packet
        .write_to(&mut stream)
        .await
        .map_err(std::io::Error::other)?;

    let response = Packet::read_from(&mut stream)
        .await
        .map_err(std::io::Error::other)?;

    Ok(response.into_payload())
}

async fn single_request(
    address: String,
    packet_bytes: Arc<Vec<u8>>,
    semaphore: Arc<Semaphore>,
    connect_timeout: Duration,
) -> Option<ServerResponse> {
    // closed only if the whole fan-out is being torn down
    let _permit = semaphore.acquire().await.ok()?;

    debug!("dialing {address}");
    match timeout(connect_timeout, exchange_packet(&address, &packet_bytes)).await {
        Ok(Ok(marshalled_data)) => Some(ServerResponse {
            marshalled_data,
            address,
        }),
        Ok(Err(err)) => {
            warn!("failed to exchange packets with {address}: {err}");
            None
        }
        Err(_) => {
            warn!("timed out communicating with {address}");
            None
        }
    }
}

/// Sends the packet to every address and collects the responses in arrival
/// order. Missing, timed-out or transport-failed servers simply do not
/// appear in the result; it is the caller's job to decide whether enough
/// arrived.
pub async fn send_server_requests(params: RequestParams) -> Vec<ServerResponse> {
    let semaphore = Arc::new(Semaphore::new(params.max_requests.max(1)));
    let packet_bytes = Arc::new(params.marshalled_packet);

    let mut in_flight = params
        .server_addresses
        .iter()
        .map(|address| {
            single_request(
                address.clone(),
                Arc::clone(&packet_bytes),
                Arc::clone(&semaphore),
                params.connect_timeout,
            )
        })
        .collect::<FuturesUnordered<_>>();

    let mut responses = Vec::with_capacity(params.server_addresses.len());

    let collection = async {
        while let Some(response) = in_flight.next().await {
            if let Some(response) = response {
                debug!("received a response from {}", response.address);
                responses.push(response);
            }
        }
    };

    if timeout(params.request_timeout, collection).await.is_err() {
        // dropping the stream cancels every request still in flight
        warn!(
            "request timeout reached - returning {} responses",
            responses.len()
        );
    }

    responses
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn spawn_echo_server(delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut len_bytes = [0u8; 4];
                    if stream.read_exact(&mut len_bytes).await.is_err() {
                        return;
                    }
                    let len = u32::from_be_bytes(len_bytes) as usize;
                    let mut payload = vec![0u8; len];
                    if stream.read_exact(&mut payload).await.is_err() {
                        return;
                    }

                    tokio::time::sleep(delay).await;

                    let mut response = (payload.len() as u32).to_be_bytes().to_vec();
                    response.extend_from_slice(&payload);
                    let _ = stream.write_all(&response).await;
                });
            }
        });

        address
    }

    fn request_packet() -> Vec<u8> {
        Packet::new(vec![101, 9, 9, 9]).to_bytes()
    }

    #[tokio::test]
    async fn collects_all_fast_responses() {
        let addresses = vec![
            spawn_echo_server(Duration::from_millis(0)).await,
            spawn_echo_server(Duration::from_millis(0)).await,
            spawn_echo_server(Duration::from_millis(0)).await,
        ];

        let responses = send_server_requests(RequestParams {
            marshalled_packet: request_packet(),
            max_requests: 4,
            connect_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_secs(2),
            server_addresses: addresses,
        })
        .await;

        assert_eq!(3, responses.len());
        for response in responses {
            assert_eq!(vec![101, 9, 9, 9], response.marshalled_data);
        }
    }

    #[tokio::test]
    async fn hung_server_does_not_block_the_others() {
        // two fast servers, one that never answers within the deadline
        let addresses = vec![
            spawn_echo_server(Duration::from_millis(10)).await,
            spawn_echo_server(Duration::from_millis(10)).await,
            spawn_echo_server(Duration::from_secs(60)).await,
        ];

        let responses = send_server_requests(RequestParams {
            marshalled_packet: request_packet(),
            max_requests: 4,
            connect_timeout: Duration::from_millis(80),
            request_timeout: Duration::from_millis(100),
            server_addresses: addresses.clone(),
        })
        .await;

        assert_eq!(2, responses.len());
        // the hung server's address must not appear among the responses
        assert!(responses
            .iter()
            .all(|response| response.address != addresses[2]));
    }

    #[tokio::test]
    async fn unreachable_server_is_skipped() {
        let addresses = vec![
            spawn_echo_server(Duration::from_millis(0)).await,
            // nothing listens there
            "127.0.0.1:1".to_string(),
        ];

        let responses = send_server_requests(RequestParams {
            marshalled_packet: request_packet(),
            max_requests: 2,
            connect_timeout: Duration::from_millis(200),
            request_timeout: Duration::from_secs(1),
            server_addresses: addresses,
        })
        .await;

        assert_eq!(1, responses.len());
    }

    #[tokio::test]
    async fn in_flight_connections_respect_the_bound() {
        // all servers are slow-ish; with max_requests = 1 they are contacted
        // sequentially, so the total time is at least the sum of the delays
        let addresses = vec![
            spawn_echo_server(Duration::from_millis(50)).await,
            spawn_echo_server(Duration::from_millis(50)).await,
        ];

        let started = std::time::Instant::now();
        let responses = send_server_requests(RequestParams {
            marshalled_packet: request_packet(),
            max_requests: 1,
            connect_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_secs(2),
            server_addresses: addresses,
        })
        .await;

        assert_eq!(2, responses.len());
        assert!(started.elapsed() >= Duration::from_millis(100));
    }
}
