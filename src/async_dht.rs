//! AsyncDht node.

use std::net::SocketAddr;

use crate::{
    actor::Info,
    common::{Id, Node},
    core::{join::JoinResponse, search::LookupResponse},
    dht::{ActorMessage, Dht, DhtJoinError, DhtLookupError, DhtWasShutdown},
    LookupResult, RingEvent,
};

impl Dht {
    /// Return an async version of the Dht client.
    pub fn as_async(self) -> AsyncDht {
        AsyncDht(self)
    }
}

#[derive(Debug, Clone)]
/// Async version of the Dht node.
pub struct AsyncDht(Dht);

impl AsyncDht {
    // === Getters ===

    /// Information and statistics about this [Dht] node.
    pub async fn info(&self) -> Result<Info, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<Info>(1);

        self.0
             .0
            .send(ActorMessage::Info(sender))
            .map_err(|_| DhtWasShutdown)?;

        receiver.recv_async().await.map_err(|_| DhtWasShutdown)
    }

    // === Public Methods ===

    /// Shutdown the actor thread loop.
    pub async fn shutdown(&mut self) {
        let (sender, receiver) = flume::bounded::<()>(1);

        let _ = self.0 .0.send(ActorMessage::Shutdown(sender));
        let _ = receiver.recv_async().await;
    }

    /// Async version of [Dht::find_successor].
    pub async fn find_successor(&self, target: Id) -> Result<LookupResult, DhtLookupError> {
        let (sender, receiver) = flume::bounded::<LookupResponse>(1);

        self.0
             .0
            .send(ActorMessage::FindSuccessor(target, sender))
            .map_err(|_| DhtWasShutdown)?;

        Ok(receiver.recv_async().await.map_err(|_| DhtWasShutdown)??)
    }

    /// Async version of [Dht::join].
    pub async fn join(&self, bootstrap: &[SocketAddr]) -> Result<Node, DhtJoinError> {
        let (sender, receiver) = flume::bounded::<JoinResponse>(1);

        self.0
             .0
            .send(ActorMessage::Join(bootstrap.to_vec(), sender))
            .map_err(|_| DhtWasShutdown)?;

        Ok(receiver.recv_async().await.map_err(|_| DhtWasShutdown)??)
    }

    pub async fn stabilize(&self) -> Result<(), DhtWasShutdown> {
        self.0.stabilize()
    }

    /// Same as [Dht::ring_events], use [flume::Receiver::recv_async] on the result.
    pub fn ring_events(&self) -> Result<flume::Receiver<RingEvent>, DhtWasShutdown> {
        self.0.ring_events()
    }
}

#[cfg(test)]
mod test {
    use std::net::Ipv4Addr;

    use futures::executor;

    use crate::transport::MemoryNetwork;

    use super::*;

    #[test]
    fn shutdown() {
        async fn test() {
            let mut dht = Dht::builder()
                .bind_address(Ipv4Addr::LOCALHOST.into())
                .no_bootstrap()
                .build()
                .unwrap()
                .as_async();

            dht.shutdown().await;

            assert!(dht.info().await.is_err());
        }

        executor::block_on(test());
    }

    #[test]
    fn lone_node_finds_itself() {
        async fn test() {
            let network = MemoryNetwork::new();
            let dht = Dht::builder()
                .bits(16)
                .id(Id::from(1000))
                .build_with_transport(Box::new(
                    network.bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 4000))),
                ))
                .unwrap()
                .as_async();

            let result = dht.find_successor(Id::from(5)).await.unwrap();

            assert_eq!(result.successor.id, Id::from(1000));
            assert_eq!(result.hops(), 0);
        }

        executor::block_on(test());
    }
}
