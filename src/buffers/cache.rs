//! Per-transaction derived buffer cache
//!
//! Each transaction gets a `TxBuffers` table indexed by (direction, buffer
//! type, instance index). A slot is filled on first lookup by running the buffer
//! type's extractor and transform pipeline, and is never recomputed for the
//! lifetime of the transaction. "Unavailable" and zero-length results are
//! memoized too, as `Empty`.
//!
//! A transaction is only ever inspected by the worker that owns it, so the
//! table takes `&mut self` and needs no locking.

use std::collections::HashMap;

use log::{trace, warn};

use super::registry::{BufferId, BufferRegistry, BufferType};
use crate::protocols::{Direction, Transaction, TxId};

/// Initialization state of a slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SlotState {
    #[default]
    Uninitialized,
    /// Computed; nothing to match
    Empty,
    /// Computed; holds bytes
    Populated,
}

/// One cached buffer instance
#[derive(Debug, Clone, Default)]
pub struct BufferSlot {
    state: SlotState,
    bytes: Vec<u8>,
    transforms_applied: usize,
    /// Empty because extraction had nothing, not because it was zero-length
    unavailable: bool,
}

impl BufferSlot {
    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Number of transform stages applied to the bytes
    pub fn transforms_applied(&self) -> usize {
        self.transforms_applied
    }

    pub fn view(&self) -> BufferView<'_> {
        match self.state {
            SlotState::Populated => BufferView::Bytes(&self.bytes),
            _ => BufferView::Empty,
        }
    }
}

/// What the matching engine gets back from a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferView<'a> {
    /// No candidate bytes; the buffer cannot match
    Empty,
    Bytes(&'a [u8]),
}

impl<'a> BufferView<'a> {
    pub fn is_empty(&self) -> bool {
        matches!(self, BufferView::Empty)
    }

    pub fn bytes(&self) -> Option<&'a [u8]> {
        match *self {
            BufferView::Bytes(bytes) => Some(bytes),
            BufferView::Empty => None,
        }
    }
}

/// Default cap on multi-instance indices
pub const DEFAULT_MAX_INSTANCES: u32 = 1024;

/// Slot table for one transaction
#[derive(Debug)]
pub struct TxBuffers {
    tx: TxId,
    max_instances: u32,
    /// slots[direction][buffer id][instance index]
    slots: [Vec<Vec<BufferSlot>>; 2],
    extractions: usize,
}

impl TxBuffers {
    pub fn new(tx: TxId) -> Self {
        Self::with_max_instances(tx, DEFAULT_MAX_INSTANCES)
    }

    pub fn with_max_instances(tx: TxId, max_instances: u32) -> Self {
        Self {
            tx,
            max_instances,
            slots: [Vec::new(), Vec::new()],
            extractions: 0,
        }
    }

    pub fn tx_id(&self) -> TxId {
        self.tx
    }

    /// Number of times an extractor was invoked for this transaction
    pub fn extractions(&self) -> usize {
        self.extractions
    }

    /// Existing slot, if this key was looked up before
    pub fn slot(&self, id: BufferId, index: u32, direction: Direction) -> Option<&BufferSlot> {
        self.slots[direction_index(direction)]
            .get(id.index())
            .and_then(|instances| instances.get(index as usize))
            .filter(|slot| slot.state != SlotState::Uninitialized)
    }

    /// Return the cached buffer, computing it on first use
    ///
    /// Out-of-contract requests (unknown type, nonzero index on a
    /// single-instance type, index beyond the instance cap, direction the
    /// type is not inspected in, transaction other than the table's own)
    /// yield `Empty` without touching the table.
    pub fn get_or_create(
        &mut self,
        registry: &BufferRegistry,
        tx: &Transaction,
        id: BufferId,
        index: u32,
        direction: Direction,
    ) -> BufferView<'_> {
        if tx.id != self.tx {
            warn!(
                "slot table for tx {:?} used with tx {:?}, ignoring lookup",
                self.tx, tx.id
            );
            return BufferView::Empty;
        }

        let Some(buffer) = registry.get(id) else {
            return BufferView::Empty;
        };
        if !self.in_contract(buffer, index, direction) {
            trace!(
                "tx {:?}: {}[{}] {:?} out of contract",
                self.tx,
                buffer.name(),
                index,
                direction
            );
            return BufferView::Empty;
        }

        let (buffer_idx, instance_idx) = (id.index(), index as usize);
        let table = &mut self.slots[direction_index(direction)];
        if table.len() <= buffer_idx {
            table.resize_with(buffer_idx + 1, Vec::new);
        }
        let instances = &mut table[buffer_idx];
        if instances.len() <= instance_idx {
            instances.resize_with(instance_idx + 1, BufferSlot::default);
        }

        let slot = &mut instances[instance_idx];
        if slot.state == SlotState::Uninitialized {
            self.extractions += 1;
            fill_slot(slot, buffer, tx, index, direction);
        }

        slot.view()
    }

    /// Visit occurrences 0, 1, 2, ... until extraction is first unavailable
    ///
    /// Zero-length occurrences are skipped but do not end the walk. Stops
    /// early when `f` returns true and returns that instance index.
    pub fn find_instance<F>(
        &mut self,
        registry: &BufferRegistry,
        tx: &Transaction,
        id: BufferId,
        direction: Direction,
        mut f: F,
    ) -> Option<u32>
    where
        F: FnMut(u32, &[u8]) -> bool,
    {
        let mut index = 0;
        loop {
            match self.get_or_create(registry, tx, id, index, direction).bytes() {
                Some(bytes) => {
                    if f(index, bytes) {
                        return Some(index);
                    }
                }
                None => {
                    if self.is_exhausted(id, index, direction) {
                        return None;
                    }
                }
            }
            index += 1;
        }
    }

    fn in_contract(&self, buffer: &BufferType, index: u32, direction: Direction) -> bool {
        if !buffer.directions().allows(direction) {
            return false;
        }
        if buffer.is_multi_instance() {
            index < self.max_instances
        } else {
            index == 0
        }
    }

    /// True when probing past `index` cannot yield more occurrences
    fn is_exhausted(&self, id: BufferId, index: u32, direction: Direction) -> bool {
        match self.slot(id, index, direction) {
            Some(slot) => slot.unavailable,
            // Out of contract, nothing was stored
            None => true,
        }
    }
}

fn direction_index(direction: Direction) -> usize {
    match direction {
        Direction::ToServer => 0,
        Direction::ToClient => 1,
    }
}

fn fill_slot(
    slot: &mut BufferSlot,
    buffer: &BufferType,
    tx: &Transaction,
    index: u32,
    direction: Direction,
) {
    match buffer.extractor().extract(tx, index, direction) {
        None => {
            trace!("tx {:?}: {}[{}] unavailable", tx.id, buffer.name(), index);
            slot.state = SlotState::Empty;
            slot.unavailable = true;
        }
        Some([]) => {
            trace!("tx {:?}: {}[{}] zero-length", tx.id, buffer.name(), index);
            slot.state = SlotState::Empty;
        }
        Some(data) => {
            let transforms = buffer.transforms();
            slot.bytes = transforms.apply(data);
            slot.transforms_applied = transforms.len();
            slot.state = if slot.bytes.is_empty() {
                SlotState::Empty
            } else {
                SlotState::Populated
            };
            trace!(
                "tx {:?}: {}[{}] cached {} bytes",
                tx.id,
                buffer.name(),
                index,
                slot.bytes.len()
            );
        }
    }
}

/// Per-worker map of in-flight transactions to their slot tables
#[derive(Debug)]
pub struct InspectionCache {
    max_instances: u32,
    txs: HashMap<TxId, TxBuffers>,
}

impl InspectionCache {
    pub fn new(max_instances: u32) -> Self {
        Self {
            max_instances,
            txs: HashMap::new(),
        }
    }

    /// Slot table for `tx`, created on first use
    pub fn for_tx(&mut self, tx: TxId) -> &mut TxBuffers {
        let max_instances = self.max_instances;
        self.txs
            .entry(tx)
            .or_insert_with(|| TxBuffers::with_max_instances(tx, max_instances))
    }

    /// Drop every slot of a finished transaction
    pub fn teardown(&mut self, tx: TxId) -> bool {
        self.txs.remove(&tx).is_some()
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }
}

impl Default for InspectionCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INSTANCES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::{BufferTypeDef, Extract, Extractor, Transform};
    use crate::protocols::{Cyu, DirectionMask, Ja3, QuicState, TlsState};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serves fixed occurrences and counts invocations
    #[derive(Debug)]
    struct CountingExtractor {
        occurrences: Vec<Option<Vec<u8>>>,
        calls: Arc<AtomicUsize>,
    }

    impl Extract for CountingExtractor {
        fn extract<'a>(
            &'a self,
            _tx: &'a Transaction,
            index: u32,
            _direction: Direction,
        ) -> Option<&'a [u8]> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.occurrences
                .get(index as usize)
                .and_then(|o| o.as_deref())
        }
    }

    fn counting(occurrences: &[Option<&str>], multi: bool) -> (BufferRegistry, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let extractor = CountingExtractor {
            occurrences: occurrences
                .iter()
                .map(|o| o.map(|s| s.as_bytes().to_vec()))
                .collect(),
            calls: Arc::clone(&calls),
        };
        let mut def = BufferTypeDef::new("counted", extractor);
        if multi {
            def = def.multi_instance();
        }
        let mut builder = BufferRegistry::builder();
        builder.register(def).unwrap();
        (builder.build(), calls)
    }

    fn tx() -> Transaction {
        Transaction::tls(1, TlsState::default())
    }

    #[test]
    fn test_idempotent_lookup() {
        let (registry, calls) = counting(&[Some("abcdef")], false);
        let tx = tx();
        let mut buffers = TxBuffers::new(tx.id);
        let id = BufferId(0);

        for _ in 0..5 {
            let view = buffers.get_or_create(&registry, &tx, id, 0, Direction::ToServer);
            assert_eq!(view, BufferView::Bytes(b"abcdef"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(buffers.extractions(), 1);
        assert_eq!(buffers.slot(id, 0, Direction::ToServer).unwrap().state(), SlotState::Populated);
    }

    #[test]
    fn test_unavailable_is_memoized() {
        let (registry, calls) = counting(&[None], false);
        let tx = tx();
        let mut buffers = TxBuffers::new(tx.id);

        for _ in 0..3 {
            assert!(buffers
                .get_or_create(&registry, &tx, BufferId(0), 0, Direction::ToServer)
                .is_empty());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(buffers.slot(BufferId(0), 0, Direction::ToServer).unwrap().state(), SlotState::Empty);
    }

    #[test]
    fn test_zero_length_equals_unavailable() {
        let (reg_empty, _) = counting(&[Some("")], false);
        let (reg_none, _) = counting(&[None], false);
        let tx = tx();

        let mut a = TxBuffers::new(tx.id);
        let mut b = TxBuffers::new(tx.id);
        let view_a = a.get_or_create(&reg_empty, &tx, BufferId(0), 0, Direction::ToServer);
        let view_b = b.get_or_create(&reg_none, &tx, BufferId(0), 0, Direction::ToServer);
        assert_eq!(view_a, view_b);
        assert_eq!(view_a, BufferView::Empty);
        assert_eq!(a.slot(BufferId(0), 0, Direction::ToServer).unwrap().state(), SlotState::Empty);
        assert_eq!(b.slot(BufferId(0), 0, Direction::ToServer).unwrap().state(), SlotState::Empty);
    }

    #[test]
    fn test_uninitialized_until_lookup() {
        let (registry, calls) = counting(&[Some("x")], false);
        let tx = tx();
        let mut buffers = TxBuffers::new(tx.id);
        assert!(buffers.slot(BufferId(0), 0, Direction::ToServer).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        buffers.get_or_create(&registry, &tx, BufferId(0), 0, Direction::ToServer);
        assert!(buffers.slot(BufferId(0), 0, Direction::ToServer).is_some());
    }

    #[test]
    fn test_no_transforms_keeps_bytes() {
        let (registry, _) = counting(&[Some("0123456789")], false);
        let tx = tx();
        let mut buffers = TxBuffers::new(tx.id);
        let view = buffers.get_or_create(&registry, &tx, BufferId(0), 0, Direction::ToServer);
        assert_eq!(view.bytes(), Some(&b"0123456789"[..]));
        assert_eq!(buffers.slot(BufferId(0), 0, Direction::ToServer).unwrap().transforms_applied(), 0);
    }

    #[test]
    fn test_transforms_applied_in_order() {
        let mut builder = BufferRegistry::builder();
        builder
            .register(
                BufferTypeDef::new("tls.sni.norm", Extractor::TlsSni)
                    .transforms(vec![Transform::ToUppercase, Transform::DotPrefix]),
            )
            .unwrap();
        let registry = builder.build();
        let tx = Transaction::tls(9, TlsState::default().with_sni("example.com"));
        let mut buffers = TxBuffers::new(tx.id);

        let view = buffers.get_or_create(&registry, &tx, BufferId(0), 0, Direction::ToServer);
        assert_eq!(view.bytes(), Some(&b".EXAMPLE.COM"[..]));
        assert_eq!(buffers.slot(BufferId(0), 0, Direction::ToServer).unwrap().transforms_applied(), 2);
    }

    #[test]
    fn test_multi_instance_ordering() {
        let mut builder = BufferRegistry::builder();
        let id = builder
            .register(BufferTypeDef::new("quic.cyu.string", Extractor::QuicCyuString).multi_instance())
            .unwrap();
        let registry = builder.build();
        let tx = Transaction::quic(
            2,
            QuicState::default()
                .with_cyu(Cyu::new("46,PAD", "00"))
                .with_cyu(Cyu::new("43,SNI", "11"))
                .with_cyu(Cyu::new("39,VER", "22")),
        );
        let mut buffers = TxBuffers::new(tx.id);

        // Probe out of order; results follow extraction order
        assert!(buffers.get_or_create(&registry, &tx, id, 3, Direction::ToServer).is_empty());
        assert_eq!(
            buffers.get_or_create(&registry, &tx, id, 1, Direction::ToServer).bytes(),
            Some(&b"43,SNI"[..])
        );
        assert_eq!(
            buffers.get_or_create(&registry, &tx, id, 0, Direction::ToServer).bytes(),
            Some(&b"46,PAD"[..])
        );
        assert_eq!(
            buffers.get_or_create(&registry, &tx, id, 2, Direction::ToServer).bytes(),
            Some(&b"39,VER"[..])
        );
    }

    #[test]
    fn test_find_instance_stops_at_first_gap() {
        let (registry, calls) = counting(&[Some("a"), Some(""), Some("c"), None, Some("e")], true);
        let tx = tx();
        let mut buffers = TxBuffers::new(tx.id);
        let mut seen = Vec::new();

        let found = buffers.find_instance(&registry, &tx, BufferId(0), Direction::ToServer, |i, b| {
            seen.push((i, b.to_vec()));
            false
        });

        assert_eq!(found, None);
        // Zero-length index 1 skipped, unavailable index 3 ends the walk
        assert_eq!(seen, vec![(0, b"a".to_vec()), (2, b"c".to_vec())]);
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let hit = buffers.find_instance(&registry, &tx, BufferId(0), Direction::ToServer, |_, b| b == b"c");
        assert_eq!(hit, Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_single_instance_rejects_nonzero_index() {
        let (registry, calls) = counting(&[Some("a"), Some("b")], false);
        let tx = tx();
        let mut buffers = TxBuffers::new(tx.id);
        assert!(buffers.get_or_create(&registry, &tx, BufferId(0), 1, Direction::ToServer).is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(buffers.slot(BufferId(0), 1, Direction::ToServer).is_none());
    }

    #[test]
    fn test_instance_cap() {
        let (registry, calls) = counting(&[Some("a"), Some("b"), Some("c")], true);
        let tx = tx();
        let mut buffers = TxBuffers::with_max_instances(tx.id, 2);
        let mut count = 0;
        buffers.find_instance(&registry, &tx, BufferId(0), Direction::ToServer, |_, _| {
            count += 1;
            false
        });
        assert_eq!(count, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_direction_outside_mask() {
        let mut builder = BufferRegistry::builder();
        builder
            .register(
                BufferTypeDef::new("ja3.hash", Extractor::Ja3Hash).directions(DirectionMask::TO_SERVER),
            )
            .unwrap();
        let registry = builder.build();
        let tx = Transaction::tls(4, TlsState::default().with_ja3(Ja3::new("s", "h")));
        let mut buffers = TxBuffers::new(tx.id);

        assert!(buffers.get_or_create(&registry, &tx, BufferId(0), 0, Direction::ToClient).is_empty());
        assert_eq!(buffers.extractions(), 0);
        assert_eq!(
            buffers.get_or_create(&registry, &tx, BufferId(0), 0, Direction::ToServer).bytes(),
            Some(&b"h"[..])
        );
    }

    #[test]
    fn test_directions_cached_separately() {
        let mut builder = BufferRegistry::builder();
        let id = builder
            .register(BufferTypeDef::new("sni.both", Extractor::TlsSni).directions(DirectionMask::all()))
            .unwrap();
        let registry = builder.build();
        let tx = Transaction::tls(7, TlsState::default().with_sni("example.com"));
        let mut buffers = TxBuffers::new(tx.id);

        assert!(buffers.get_or_create(&registry, &tx, id, 0, Direction::ToClient).is_empty());
        assert_eq!(
            buffers.get_or_create(&registry, &tx, id, 0, Direction::ToServer).bytes(),
            Some(&b"example.com"[..])
        );
        assert_eq!(buffers.extractions(), 2);
        assert_eq!(buffers.slot(id, 0, Direction::ToClient).unwrap().state(), SlotState::Empty);
        assert_eq!(buffers.slot(id, 0, Direction::ToServer).unwrap().state(), SlotState::Populated);
    }

    #[test]
    fn test_default_mask_follows_extractor() {
        let mut builder = BufferRegistry::builder();
        let id = builder.register(BufferTypeDef::new("sni.default", Extractor::TlsSni)).unwrap();
        let registry = builder.build();
        assert_eq!(registry.get(id).unwrap().directions(), DirectionMask::TO_SERVER);

        let tx = Transaction::tls(8, TlsState::default().with_sni("example.com"));
        let mut buffers = TxBuffers::new(tx.id);
        assert!(buffers.get_or_create(&registry, &tx, id, 0, Direction::ToClient).is_empty());
        assert_eq!(buffers.extractions(), 0);
        assert_eq!(
            buffers.get_or_create(&registry, &tx, id, 0, Direction::ToServer).bytes(),
            Some(&b"example.com"[..])
        );
    }

    #[test]
    fn test_other_transaction_ignored() {
        let (registry, calls) = counting(&[Some("abc")], false);
        let tx = tx();
        let mut buffers = TxBuffers::new(TxId(2));

        assert!(buffers.get_or_create(&registry, &tx, BufferId(0), 0, Direction::ToServer).is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(buffers.extractions(), 0);
        assert!(buffers.slot(BufferId(0), 0, Direction::ToServer).is_none());
    }

    #[test]
    fn test_inspection_cache_teardown() {
        let mut cache = InspectionCache::default();
        assert_eq!(cache.for_tx(TxId(5)).tx_id(), TxId(5));
        cache.for_tx(TxId(6));
        cache.for_tx(TxId(5));
        assert_eq!(cache.len(), 2);
        assert!(cache.teardown(TxId(5)));
        assert!(!cache.teardown(TxId(5)));
        assert_eq!(cache.len(), 1);
    }
}
