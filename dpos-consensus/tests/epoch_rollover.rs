//! End-to-end epoch rollover: candidates register, stake is delegated, an
//! epoch boundary elects and rotates a validator set, and the elected
//! validators seal blocks that pass full verification.

use std::sync::Arc;

use dpos_consensus::{
    BlockValidator, DposConfig, DposEngine, DposState, EpochElection, KeypairSigner,
    MemoryBalances, MemoryChain, DPOS_DIFFICULTY,
};
use dpos_core::{Block, TrieDb};
use tokio::sync::oneshot;

fn test_config() -> DposConfig {
    DposConfig {
        block_interval: 10,
        epoch_interval: 600,
        max_validator_size: 3,
    }
}

#[tokio::test]
async fn epoch_rollover_elects_and_seals() {
    let config = test_config();
    let signer = Arc::new(KeypairSigner::new());

    // Three candidates with distinct stakes behind them
    let x = signer.generate();
    let y = signer.generate();
    let z = signer.generate();
    let delegator_a = signer.generate();
    let delegator_b = signer.generate();
    let delegator_c = signer.generate();

    let mut balances = MemoryBalances::new();
    balances.set(delegator_a, 300);
    balances.set(delegator_b, 200);
    balances.set(delegator_c, 100);

    let mut state = DposState::new(TrieDb::new());
    for candidate in [x, y, z] {
        state.become_candidate(&candidate).unwrap();
    }
    state.delegate(&delegator_a, &x).unwrap();
    state.delegate(&delegator_b, &y).unwrap();
    state.delegate(&delegator_c, &z).unwrap();

    // Vote tally reflects delegated balances
    let votes = state.count_votes(&balances).unwrap();
    assert_eq!(votes.get(&x), Some(&300));
    assert_eq!(votes.get(&y), Some(&200));
    assert_eq!(votes.get(&z), Some(&100));

    // Chain bootstraps inside the genesis epoch
    let chain = Arc::new(MemoryChain::new());
    let genesis = Block::genesis(100);
    chain.insert(genesis.clone()).unwrap();

    let mut parent = genesis.clone();
    parent.header.number = 1;
    parent.header.timestamp = 590;
    parent.header.parent_hash = genesis.hash().unwrap();
    chain.insert(parent.clone()).unwrap();

    // Crossing into the next epoch triggers an election
    let election = EpochElection::new(config.clone(), parent.header.timestamp);
    let target = 600;
    election
        .try_elect(&mut state, &genesis.header, &parent.header, target, &balances)
        .unwrap();

    let validators = state.validators().unwrap();
    assert_eq!(validators.len(), 3);
    let mut sorted = validators.clone();
    sorted.sort();
    let mut expected = vec![x, y, z];
    expected.sort();
    assert_eq!(sorted, expected);

    // The slot schedule rotates through the elected set and repeats each epoch
    let first = election.lookup_validator(&state, target).unwrap();
    assert!(validators.contains(&first));
    assert_eq!(
        first,
        election
            .lookup_validator(&state, target + config.epoch_interval)
            .unwrap()
    );

    // The slot owner seals the next block and everyone can verify it
    let engine = Arc::new(DposEngine::new(config.clone(), first, signer.clone()));
    let mut block = Block::genesis(0);
    block.header.parent_hash = parent.hash().unwrap();
    block.header.number = 2;
    block.header.miner = first;
    block.header.difficulty = DPOS_DIFFICULTY;
    block.header.gas_limit = parent.header.gas_limit;
    block.header.transactions_root = block.compute_transactions_root().unwrap();

    let (_stop_tx, stop_rx) = oneshot::channel();
    let sealed = engine
        .seal_at(block, target, stop_rx)
        .await
        .unwrap()
        .expect("sealing was not aborted");
    assert_eq!(sealed.header.timestamp, target);

    let validator = BlockValidator::new(config, engine.clone(), chain.clone());
    validator.validate_header(&sealed.header, true).unwrap();

    // A seal from a non-slot key still recovers to its own miner, so forging
    // another validator's identity fails verification
    let forged_miner = if first == x { y } else { x };
    let mut forged = sealed.clone();
    forged.header.miner = forged_miner;
    assert!(engine.verify_seal(chain.as_ref(), &forged.header).is_err());
}

#[tokio::test]
async fn kickout_shrinks_set_at_rollover() {
    // Six candidates, three validators; one validator idles through the
    // first full epoch and is evicted at the boundary
    let config = test_config();
    let mut balances = MemoryBalances::new();
    let mut state = DposState::new(TrieDb::new());

    let signer = KeypairSigner::new();
    let candidates: Vec<_> = (0..6).map(|_| signer.generate()).collect();
    for (i, candidate) in candidates.iter().enumerate() {
        state.become_candidate(candidate).unwrap();
        balances.set(*candidate, (600 - i as u128 * 100).max(1));
        state.delegate(candidate, candidate).unwrap();
    }
    let active = [candidates[0], candidates[1]];
    let idle = candidates[2];
    state
        .set_validators(&[active[0], active[1], idle])
        .unwrap();

    // Epoch 1 mint counts: the two active validators clear the threshold
    let threshold = config.kickout_threshold(config.epoch_interval);
    for _ in 0..threshold {
        for validator in &active {
            state
                .update_mint_count(700, config.epoch_interval, validator)
                .unwrap();
        }
    }
    assert!(state.has_mint_counts(1).unwrap());

    let genesis = Block::genesis(0);
    let mut parent = Block::genesis(1190);
    parent.header.number = 60;

    let election = EpochElection::new(config, 10);
    election
        .try_elect(
            &mut state,
            &genesis.header,
            &parent.header,
            1200,
            &balances,
        )
        .unwrap();

    // The idle validator lost its candidacy and with it any future votes
    assert!(!state.is_candidate(&idle).unwrap());
    let validators = state.validators().unwrap();
    assert_eq!(validators.len(), 3);
    assert!(!validators.contains(&idle));
    for validator in &active {
        assert!(state.is_candidate(validator).unwrap());
    }
}
