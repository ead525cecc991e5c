mod common;

use common::*;
use std::sync::Arc;
use synroute::config::DecoderConfig;
use synroute::engines::planning::{
    NodeKind, NodeValue, Program, RealizedPlan, Skeleton, TreeDecoder, TreeShape,
};
use synroute::types::Target;
use synroute::SynrouteError;

fn target() -> Target {
    Target::Molecule("CCX".to_string())
}

#[test]
fn test_two_node_terminal_skeleton_yields_one_beam() {
    init_logging();
    let decoder = decoder(ContextOptions::default());

    let mut builder = Skeleton::builder(NodeKind::Terminal);
    let leaf = builder.add_child(0, NodeKind::Terminal);
    let skeleton = builder.build(target()).unwrap();

    let beams = decoder.decode_skeleton(skeleton, 1, 1).unwrap();
    assert_eq!(beams.len(), 1);
    let beam = &beams[0];
    assert!(beam.is_complete());
    assert_eq!(beam.value(leaf), Some(NodeValue::Molecule(0)));
    assert_eq!(beam.assigned_leaf_count(), 1);
}

#[test]
fn test_beam_count_is_bounded() {
    let decoder = decoder(ContextOptions::default());
    let shape = TreeShape::single_step(2);

    for (beam_width, top_k, expected) in [(3, 2, 2), (3, 1, 1), (1, 3, 1), (2, 5, 2)] {
        let beams = decoder.decode_shape(&shape, target(), beam_width, top_k).unwrap();
        assert_eq!(beams.len(), expected, "beam_width={} top_k={}", beam_width, top_k);
        assert!(beams.iter().all(Skeleton::is_complete));
    }
}

#[test]
fn test_branches_differ_only_in_first_building_block() {
    let decoder = decoder(ContextOptions::default());
    let beams = decoder
        .decode_shape(&TreeShape::single_step(2), target(), 3, 3)
        .unwrap();
    assert_eq!(beams.len(), 3);
    // Leaves are nodes 2 and 3; the first filled leaf takes the ranked candidates in order.
    let first: Vec<_> = beams.iter().map(|b| b.molecule(2)).collect();
    assert_eq!(first, vec![Some(0), Some(1), Some(2)]);
    assert!(beams.iter().all(|b| b.molecule(3) == Some(0)));
}

#[test]
fn test_infeasible_template_is_never_selected() {
    // The model prefers `dead`, which no building block can feed.
    let options = ContextOptions {
        logits: vec![0.0, 5.0, -1.0],
        ..ContextOptions::default()
    };
    let decoder = decoder(options);
    let beams = decoder
        .decode_shape(&TreeShape::single_step(1), target(), 1, 1)
        .unwrap();
    assert_eq!(beams[0].template(1), Some(TAG));

    let unindexed = common::decoder(ContextOptions {
        logits: vec![0.0, 5.0, -1.0],
        indexed: false,
        ..ContextOptions::default()
    });
    let beams = unindexed
        .decode_shape(&TreeShape::single_step(1), target(), 1, 1)
        .unwrap();
    assert_eq!(beams[0].template(1), Some(DEAD));
}

#[test]
fn test_arity_mask_applies_without_index() {
    let decoder = decoder(ContextOptions {
        logits: vec![9.0, 9.0, 0.0],
        indexed: false,
        ..ContextOptions::default()
    });
    let beams = decoder
        .decode_shape(&TreeShape::single_step(2), target(), 1, 1)
        .unwrap();
    assert_eq!(beams[0].template(1), Some(JOIN));
}

#[test]
fn test_terminals_restricted_to_indexed_entries() {
    let decoder = decoder(ContextOptions::default());
    let beams = decoder
        .decode_shape(&TreeShape::single_step(1), target(), 1, 1)
        .unwrap();
    // "NN" is nearest but `tag` only accepts C-prefixed reactants.
    assert_eq!(beams[0].molecule(2), Some(1));

    let unindexed = common::decoder(ContextOptions { indexed: false, ..ContextOptions::default() });
    let beams = unindexed
        .decode_shape(&TreeShape::single_step(1), target(), 1, 1)
        .unwrap();
    assert_eq!(beams[0].molecule(2), Some(0));
}

#[test]
fn test_small_restricted_set_falls_back_to_catalog() {
    let decoder = decoder(ContextOptions::default());
    // Only two indexed entries for three requested candidates.
    let beams = decoder
        .decode_shape(&TreeShape::single_step(1), target(), 3, 3)
        .unwrap();
    let chosen: Vec<_> = beams.iter().map(|b| b.molecule(2)).collect();
    assert_eq!(chosen, vec![Some(0), Some(1), Some(2)]);
}

#[test]
fn test_two_step_plan_masks_intermediate_and_realizes() {
    let decoder = decoder(ContextOptions::default());
    let beams = decoder
        .decode_shape(&TreeShape::linear(2), target(), 1, 1)
        .unwrap();
    let beam = &beams[0];
    assert!(beam.is_complete());
    assert!(beam.is_masked(2));
    assert_eq!(beam.template(1), Some(TAG));
    assert_eq!(beam.template(3), Some(TAG));
    assert_eq!(beam.molecule(4), Some(1));

    let plan = RealizedPlan::realize(decoder.context(), beam).unwrap();
    assert_eq!(plan.product, "CCXX");
    assert_eq!(plan.molecules[2].as_deref(), Some("CCX"));
}

#[test]
fn test_realization_failure_on_every_beam_exhausts() {
    let decoder = common::decoder(ContextOptions { indexed: false, ..ContextOptions::default() });
    let beams = decoder
        .decode_shape(&TreeShape::single_step(1), target(), 1, 1)
        .unwrap();
    // Unrestricted search picks "NN", which `tag` rejects.
    let err = RealizedPlan::realize_all(decoder.context(), &beams).unwrap_err();
    assert!(matches!(err, SynrouteError::DecoderExhausted(_)));
}

#[test]
fn test_decode_predicts_shape_from_fingerprint() {
    let decoder = decoder(ContextOptions::default());
    let fp = synroute::types::Fingerprint::zeros(64);
    let beams = decoder.decode(&Target::Fingerprint(fp), 1, 1).unwrap();
    // Rank 1 of the fake predictor is a single unary step.
    assert_eq!(beams[0].len(), 3);
    assert!(beams[0].is_complete());
}

#[test]
fn test_decode_batch_is_independent_per_target() {
    let decoder = decoder(ContextOptions::default());
    let targets = vec![target(), Target::Molecule("COX".to_string()), Target::Molecule(String::new())];
    let results = decoder.decode_batch(&targets, 2, 2);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().len(), 2);
    assert_eq!(results[1].as_ref().unwrap().len(), 2);
    // The empty identifier cannot be fingerprinted for shape prediction.
    assert!(results[2].is_err());
}

#[test]
fn test_model_failure_on_only_beam_exhausts() {
    let mut ctx = (*context(ContextOptions::default())).clone();
    ctx.terminal_model = Arc::new(FailingModel);
    let decoder = TreeDecoder::new(Arc::new(ctx), DecoderConfig::default()).unwrap();
    let err = decoder
        .decode_shape(&TreeShape::single_step(1), target(), 1, 1)
        .unwrap_err();
    assert!(matches!(err, SynrouteError::DecoderExhausted(_)));
}

#[test]
fn test_model_failure_drops_only_that_beam() {
    let mut ctx = (*context(ContextOptions::default())).clone();
    ctx.terminal_model = Arc::new(FailsOnMolecule(2));
    let decoder = TreeDecoder::new(Arc::new(ctx), DecoderConfig::default()).unwrap();

    // The branch holding "CO" fails when scored for its second leaf.
    let beams = decoder
        .decode_shape(&TreeShape::single_step(2), target(), 3, 3)
        .unwrap();
    let first: Vec<_> = beams.iter().map(|b| b.molecule(2)).collect();
    assert_eq!(first, vec![Some(0), Some(1)]);
    assert!(beams.iter().all(Skeleton::is_complete));
}

#[test]
fn test_size_one_index_masks_infeasible_template() {
    let decoder = decoder(ContextOptions {
        logits: vec![0.0, 5.0, -1.0],
        program_size: 1,
        ..ContextOptions::default()
    });
    let index = decoder.context().index.clone().unwrap();
    assert!(index.exists(&Program::leaf(TAG, 1)));
    assert!(!index.exists(&Program::leaf(DEAD, 1)));

    for top_k in 1..=3 {
        let beams = decoder
            .decode_shape(&TreeShape::single_step(1), target(), top_k, top_k)
            .unwrap();
        assert!(beams.iter().all(|b| b.template(1) == Some(TAG)));
    }
}

#[test]
fn test_terminal_order_uses_unrestricted_distance() {
    // join(leaf 2, tag(leaf 5)); leaf 5 may only take C-prefixed blocks.
    let shape = TreeShape::new(vec![vec![1, 2], vec![], vec![3], vec![]]).unwrap();
    let mut ctx = (*context(ContextOptions::default())).clone();
    ctx.terminal_model = Arc::new(PerNodeEmbedding(vec![
        vec![0.0, 0.0],
        vec![0.0, 0.0],
        vec![0.5, 0.0],
        vec![0.0, 0.0],
        vec![0.0, 0.0],
        vec![0.0, 0.0],
    ]));
    let decoder = TreeDecoder::new(Arc::new(ctx), DecoderConfig::default()).unwrap();

    let beams = decoder.decode_shape(&shape, target(), 2, 2).unwrap();
    assert_eq!(beams.len(), 2);
    // Leaf 5 sits on "NN" itself, so it is filled (and branched) first,
    // even though its own candidates start at "CC".
    let branched: Vec<_> = beams.iter().map(|b| b.molecule(5)).collect();
    assert_eq!(branched, vec![Some(1), Some(2)]);
    assert!(beams.iter().all(|b| b.molecule(2) == Some(0)));

    let plan = RealizedPlan::realize(decoder.context(), &beams[0]).unwrap();
    assert_eq!(plan.product, "NN.CCX");
}
