use rustc_hash::FxHashMap;

use crate::chain::{RawBlock, RawEvent, RawExtrinsic};
use crate::utils::extrinsic_id;

/// A block's events grouped by the extrinsic that emitted them.
///
/// Built once per block; every extraction rule that correlates events
/// (success gating, bridge sender lookup, liquidity amounts) queries it
/// instead of rescanning the event list.
pub struct BlockIndex<'a> {
    block: &'a RawBlock,
    events: &'a [RawEvent],
    by_extrinsic: FxHashMap<u32, Vec<&'a RawEvent>>,
}

impl<'a> BlockIndex<'a> {
    pub fn new(block: &'a RawBlock, events: &'a [RawEvent]) -> Self {
        let mut by_extrinsic: FxHashMap<u32, Vec<&'a RawEvent>> = FxHashMap::default();
        for event in events {
            if let Some(index) = event.extrinsic_index() {
                by_extrinsic.entry(index).or_default().push(event);
            }
        }

        Self {
            block,
            events,
            by_extrinsic,
        }
    }

    pub fn number(&self) -> u64 {
        self.block.number
    }

    pub fn hash(&self) -> &str {
        &self.block.hash
    }

    pub fn extrinsics(&self) -> &'a [RawExtrinsic] {
        &self.block.extrinsics
    }

    pub fn extrinsic(&self, index: u32) -> Option<&'a RawExtrinsic> {
        self.block.extrinsics.get(index as usize)
    }

    pub fn events(&self) -> &'a [RawEvent] {
        self.events
    }

    pub fn events_matching<'s>(
        &'s self,
        pallet: &'s str,
        method: &'s str,
    ) -> impl Iterator<Item = &'a RawEvent> + 's {
        self.events.iter().filter(move |e| e.is(pallet, method))
    }

    /// Events emitted while applying extrinsic `index`, in emission order.
    pub fn events_in(&self, index: u32) -> &[&'a RawEvent] {
        self.by_extrinsic
            .get(&index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn find_in(&self, index: u32, pallet: &str, method: &str) -> Option<&'a RawEvent> {
        self.events_in(index)
            .iter()
            .copied()
            .find(|e| e.is(pallet, method))
    }

    /// Whether `system.ExtrinsicSuccess` fired for extrinsic `index`.
    pub fn succeeded(&self, index: u32) -> bool {
        self.find_in(index, "system", "ExtrinsicSuccess").is_some()
    }

    /// Hash of the extrinsic at `index`, empty for block-level events.
    pub fn extrinsic_hash(&self, index: Option<u32>) -> String {
        index
            .and_then(|i| self.extrinsic(i))
            .map(|ext| ext.hash.clone())
            .unwrap_or_default()
    }

    /// `{block}-{index}`, or the bare block number for block-level events.
    pub fn extrinsic_id(&self, index: Option<u32>) -> String {
        match index {
            Some(i) => extrinsic_id(self.block.number, i),
            None => self.block.number.to_string(),
        }
    }

    pub fn signer(&self, index: Option<u32>) -> Option<String> {
        index.and_then(|i| self.extrinsic(i))?.signer.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Phase;
    use crate::testing::{block_with, event, extrinsic};
    use serde_json::json;

    #[test]
    fn test_events_grouped_by_extrinsic() {
        let block = block_with(
            77,
            vec![
                extrinsic(0, "timestamp", "set", None, json!({})),
                extrinsic(1, "balances", "transfer", Some("cnAlice"), json!({})),
            ],
        );
        let mut events = vec![
            event(0, "system", "ExtrinsicSuccess", json!([])),
            event(1, "balances", "Transfer", json!(["cnAlice", "cnBob", "5"])),
            event(1, "system", "ExtrinsicFailed", json!([])),
        ];
        events.push(crate::chain::RawEvent {
            pallet: "rewards".to_string(),
            method: "Tick".to_string(),
            phase: Phase::Finalization,
            data: json!([]),
        });

        let index = BlockIndex::new(&block, &events);
        assert!(index.succeeded(0));
        assert!(!index.succeeded(1));
        assert_eq!(index.events_in(1).len(), 2);
        assert!(index.events_in(5).is_empty());
        assert_eq!(index.extrinsic_id(Some(1)), "77-1");
        assert_eq!(index.extrinsic_id(None), "77");
        assert_eq!(index.signer(Some(1)).as_deref(), Some("cnAlice"));
        assert_eq!(index.events_matching("balances", "Transfer").count(), 1);
    }
}
