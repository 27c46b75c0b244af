use super::delta::process_transaction;
use crate::btc::{CCTransaction, PeerClientRef};
use crate::cc::AssetCodecRef;
use crate::constants::MEMPOOL_BLOCK_HEIGHT;
use crate::db::{MempoolBookkeeping, ParsedMempoolTx, StateStoreRef, UndoLogRef, UtxoDelta};
use crate::error::{IndexError, IndexResult};
use crate::event::EventBusRef;
use bitcoincore_rpc::bitcoin::{Network, Transaction, Txid};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MempoolOutcome {
    pub reverted: usize,
    pub added: usize,
    pub total: usize,
}

/// Kahn's algorithm over `(id, parent ids)` nodes. Parents outside the batch
/// are ignored, ties go to the lowest index. Returns indices in order.
pub fn dependency_order(nodes: &[(String, Vec<String>)]) -> IndexResult<Vec<usize>> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, (_, parents)) in nodes.iter().enumerate() {
        let parents: HashSet<usize> = parents
            .iter()
            .filter_map(|p| index.get(p.as_str()).copied())
            .collect();

        in_degree[i] = parents.len();
        for parent in parents {
            dependents[parent].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &child in &dependents[i] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.push(Reverse(child));
            }
        }
    }

    if order.len() != nodes.len() {
        let cycle: Vec<String> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree > 0)
            .map(|(i, _)| nodes[i].0.clone())
            .collect();
        error!("Dependency cycle among mempool transactions: {:?}", cycle);
        return Err(IndexError::DependencyCycle(cycle));
    }

    Ok(order)
}

/// Order transactions so that every transaction comes after the ones in the
/// same batch whose outputs it spends. Independent transactions keep their
/// listing order.
pub fn sort_by_dependency(txs: Vec<Transaction>) -> IndexResult<Vec<Transaction>> {
    let nodes: Vec<(String, Vec<String>)> = txs
        .iter()
        .map(|tx| {
            let parents = tx
                .input
                .iter()
                .map(|input| input.previous_output.txid.to_string())
                .collect();
            (tx.compute_txid().to_string(), parents)
        })
        .collect();

    let order = dependency_order(&nodes)?;
    let mut slots: Vec<Option<Transaction>> = txs.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

/// Keeps the state store in line with the peer's mempool while the chain is
/// caught up.
pub struct MempoolReconciler {
    network: Network,
    peer: PeerClientRef,
    store: StateStoreRef,
    undo_log: UndoLogRef,
    codec: AssetCodecRef,
    events: EventBusRef,

    // Txids already published while pending. Survives `unwind_all`, so a
    // re-parse after a block does not emit the same transaction again.
    announced: Mutex<HashSet<String>>,
}

impl MempoolReconciler {
    pub fn new(
        network: Network,
        peer: PeerClientRef,
        store: StateStoreRef,
        undo_log: UndoLogRef,
        codec: AssetCodecRef,
        events: EventBusRef,
    ) -> Self {
        Self {
            network,
            peer,
            store,
            undo_log,
            codec,
            events,
            announced: Mutex::new(HashSet::new()),
        }
    }

    // True the first time a pending txid is seen
    fn first_announcement(&self, txid: &str) -> bool {
        self.announced.lock().unwrap().insert(txid.to_string())
    }

    pub async fn reconcile(&self) -> IndexResult<MempoolOutcome> {
        let mut bookkeeping = self.store.get_mempool_bookkeeping()?;
        let mut outcome = MempoolOutcome::default();

        // Evicted in an earlier pass, reverse application order
        if !bookkeeping.to_revert.is_empty() {
            let to_revert: HashSet<String> = bookkeeping.to_revert.drain(..).collect();
            let targets: Vec<ParsedMempoolTx> = bookkeeping
                .parsed
                .iter()
                .rev()
                .filter(|p| to_revert.contains(&p.txid))
                .cloned()
                .collect();

            for parsed in &targets {
                self.revert_one(parsed, &mut bookkeeping)?;
            }
            self.store.put_mempool_bookkeeping(&bookkeeping)?;
            outcome.reverted = targets.len();
        }

        let current = self.peer.get_raw_mempool().await?;
        let current_ids: HashSet<String> = current.iter().map(|t| t.to_string()).collect();
        self.announced
            .lock()
            .unwrap()
            .retain(|txid| current_ids.contains(txid));

        let new_ids: Vec<Txid> = current
            .iter()
            .filter(|txid| !bookkeeping.is_parsed(&txid.to_string()))
            .copied()
            .collect();
        bookkeeping.to_revert = bookkeeping
            .parsed
            .iter()
            .filter(|p| !current_ids.contains(&p.txid))
            .map(|p| p.txid.clone())
            .collect();

        if !bookkeeping.to_revert.is_empty() {
            info!(
                "{} mempool txs left the mempool, reverting next pass",
                bookkeeping.to_revert.len()
            );
        }

        let mut txs = Vec::with_capacity(new_ids.len());
        for txid in &new_ids {
            txs.push(self.peer.get_raw_transaction(txid).await?);
        }
        let txs = sort_by_dependency(txs)?;

        for raw_tx in &txs {
            let mut tx = CCTransaction::decode(raw_tx, self.network, &**self.codec);
            if !tx.is_colored() {
                bookkeeping.mark_parsed(tx.txid.clone(), false);
                if self.first_announcement(&tx.txid) {
                    self.events.publish_transaction(&tx);
                }
                continue;
            }

            let mut delta = UtxoDelta::default();
            process_transaction(
                &self.store,
                &**self.codec,
                &mut tx,
                MEMPOOL_BLOCK_HEIGHT,
                &mut delta,
            )?;

            self.undo_log.put_mempool_undo(&tx.txid, &delta)?;
            bookkeeping.mark_parsed(tx.txid.clone(), true);
            self.store.apply_mempool_tx(&delta, &bookkeeping)?;

            debug!(
                "Applied mempool tx {}: {} used, {} unused",
                tx.txid,
                delta.used.len(),
                delta.unused.len()
            );
            if self.first_announcement(&tx.txid) {
                self.events.publish_transaction(&tx);
            }
        }

        self.store.put_mempool_bookkeeping(&bookkeeping)?;

        outcome.added = txs.len();
        outcome.total = bookkeeping.parsed.len();
        Ok(outcome)
    }

    /// Revert every applied mempool transaction, newest first, and clear the
    /// bookkeeping. Used before a confirmed block is applied.
    pub fn unwind_all(&self) -> IndexResult<usize> {
        let mut bookkeeping = self.store.get_mempool_bookkeeping()?;
        if bookkeeping.parsed.is_empty() && bookkeeping.to_revert.is_empty() {
            return Ok(0);
        }

        let parsed: Vec<ParsedMempoolTx> = bookkeeping.parsed.iter().rev().cloned().collect();
        for p in &parsed {
            self.revert_one(p, &mut bookkeeping)?;
        }

        let bookkeeping = MempoolBookkeeping::default();
        self.store.put_mempool_bookkeeping(&bookkeeping)?;

        debug!("Unwound {} mempool txs", parsed.len());
        Ok(parsed.len())
    }

    fn revert_one(
        &self,
        parsed: &ParsedMempoolTx,
        bookkeeping: &mut MempoolBookkeeping,
    ) -> IndexResult<()> {
        bookkeeping.remove(&parsed.txid);
        if !parsed.colored {
            return Ok(());
        }

        let delta = self.undo_log.get_mempool_undo(&parsed.txid)?.ok_or_else(|| {
            let msg = format!("No undo entry for mempool tx {}", parsed.txid);
            error!("{}", msg);
            IndexError::UndoLogMissing(msg)
        })?;

        self.store.revert_mempool_tx(&delta, bookkeeping)?;
        self.undo_log.delete_mempool_undo(&parsed.txid)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btc::tx::tests::{fake_txid, make_tx};

    #[test]
    fn test_sort_by_dependency() {
        let a = make_tx(&[(fake_txid(1), 0)], &[1], None);
        let b = make_tx(&[(a.compute_txid(), 0)], &[2], None);
        let c = make_tx(&[(b.compute_txid(), 0), (a.compute_txid(), 1)], &[3], None);
        let d = make_tx(&[(fake_txid(2), 0)], &[4], None);

        let sorted = sort_by_dependency(vec![c.clone(), d.clone(), b.clone(), a.clone()]).unwrap();
        let ids: Vec<Txid> = sorted.iter().map(|t| t.compute_txid()).collect();
        assert_eq!(
            ids,
            vec![
                d.compute_txid(),
                a.compute_txid(),
                b.compute_txid(),
                c.compute_txid()
            ]
        );

        // Independent transactions keep their listing order
        let sorted = sort_by_dependency(vec![d.clone(), a.clone()]).unwrap();
        assert_eq!(sorted, vec![d, a]);

        assert!(sort_by_dependency(vec![]).unwrap().is_empty());
    }

    #[test]
    fn test_dependency_cycle() {
        let node = |id: &str, parents: &[&str]| {
            (id.to_string(), parents.iter().map(|p| p.to_string()).collect::<Vec<_>>())
        };

        let nodes = vec![node("x", &["y"]), node("y", &["x"]), node("z", &["w"])];
        match dependency_order(&nodes) {
            Err(IndexError::DependencyCycle(ids)) => {
                assert_eq!(ids, vec!["x".to_string(), "y".to_string()])
            }
            other => panic!("Expected a cycle, got {:?}", other),
        }

        // Duplicate parent references count once
        let nodes = vec![node("b", &["a", "a"]), node("a", &[])];
        assert_eq!(dependency_order(&nodes).unwrap(), vec![1, 0]);
    }
}
