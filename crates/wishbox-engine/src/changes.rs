use tokio::sync::broadcast;

/// Logical tables of the store. Live queries declare which of these they
/// read so the bus can tell them when to recompute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Table {
    Users,
    Relationships,
    Events,
    Items,
}

/// Commit notification fan-out. Every façade mutation publishes the table
/// it touched after the write lands; live queries re-run their reads on
/// each notification for a table they depend on.
#[derive(Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<Table>,
}

impl ChangeBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Announce a committed change. No subscribers is fine.
    pub fn publish(&self, table: Table) {
        let _ = self.tx.send(table);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Table> {
        self.tx.subscribe()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = ChangeBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(Table::Items);
        assert_eq!(rx.recv().await.unwrap(), Table::Items);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let bus = ChangeBus::new(8);
        bus.publish(Table::Users);
    }

    #[tokio::test]
    async fn each_subscriber_sees_every_change() {
        let bus = ChangeBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish(Table::Events);
        bus.publish(Table::Relationships);
        assert_eq!(a.recv().await.unwrap(), Table::Events);
        assert_eq!(a.recv().await.unwrap(), Table::Relationships);
        assert_eq!(b.recv().await.unwrap(), Table::Events);
        assert_eq!(b.recv().await.unwrap(), Table::Relationships);
    }
}
