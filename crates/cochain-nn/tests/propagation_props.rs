//! Property-based tests for the propagation engine.
//!
//! - Lifting selects one feature row per edge endpoint
//! - Declared up/down sizes must agree
//! - Endpoints without messages reduce to zero
//! - The fused sparse path agrees with the separate explicit path

use candle_core::{Device, Tensor};
use cochain_nn::{
    aggr::{scatter, segment_csr_ptr},
    default_signature, Adjacency, Aggregation, Args, ChainConfig, ChainMessagePassing,
    ChainPropagator, Collector, DefaultChain, Direction, Role, Signature, SparseAdjacency,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

/// `n` cells with `edges` random directed pairs.
fn arb_graph() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1usize..8).prop_flat_map(|n| (Just(n), prop::collection::vec((0..n, 0..n), 0..20)))
}

/// Feature row `i` is `[10 i, 10 i + 1, ...]`.
fn features(n: usize, d: usize, device: &Device) -> Tensor {
    let data: Vec<f32> = (0..n)
        .flat_map(|i| (0..d).map(move |k| (10 * i + k) as f32))
        .collect();
    Tensor::from_vec(data, (n, d), device).unwrap()
}

fn split(edges: &[(usize, usize)]) -> (Vec<usize>, Vec<usize>) {
    edges.iter().copied().unzip()
}

/// Sums neighbour features in one sparse product.
struct FusedSum(ChainConfig);

impl ChainMessagePassing for FusedSum {
    fn config(&self) -> &ChainConfig {
        &self.0
    }

    fn signature(&self, role: Role) -> Option<Signature> {
        match role {
            Role::MessageAndAggregateUp | Role::MessageAndAggregateDown => {
                Some(Signature::new().required("x"))
            }
            _ => default_signature(role),
        }
    }

    fn message_and_aggregate_up(
        &self,
        adj_t: &SparseAdjacency,
        args: &Args,
    ) -> cochain_nn::Result<Tensor> {
        adj_t.spmm(args.tensor("x")?, 0, Aggregation::Add)
    }

    fn message_and_aggregate_down(
        &self,
        adj_t: &SparseAdjacency,
        args: &Args,
    ) -> cochain_nn::Result<Tensor> {
        adj_t.spmm(args.tensor("x")?, 0, Aggregation::Add)
    }
}

mod lifting_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn target_lift_selects_target_rows(
            (n, edges) in arb_graph(),
            d in 1usize..4,
        ) {
            let device = Device::Cpu;
            let (sources, targets) = split(&edges);
            let adj = Adjacency::from_pairs(&sources, &targets, &device).unwrap();
            let x = features(n, d, &device);
            let collector = Collector::new(&ChainConfig::default());
            let names: BTreeSet<String> = ["up_x_i".to_string()].into_iter().collect();
            let mut size = [None, None];

            let out = collector
                .collect(&names, Some(&adj), &mut size, Direction::Up, &Args::new().with("x", &x))
                .unwrap();
            let lifted = out.tensor("up_x_i").unwrap();
            prop_assert_eq!(lifted.dims(), &[edges.len(), d]);

            let rows = x.to_vec2::<f32>().unwrap();
            let lifted = lifted.to_vec2::<f32>().unwrap();
            for (k, &t) in targets.iter().enumerate() {
                prop_assert_eq!(&lifted[k], &rows[t]);
            }
            prop_assert_eq!(size[1], Some(n));
        }
    }
}

mod size_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn equal_sizes_pass_shrunk_sizes_fail(
            (n, edges) in arb_graph(),
            shrink_source in any::<bool>(),
        ) {
            let device = Device::Cpu;
            let (sources, targets) = split(&edges);
            let adj = Adjacency::from_pairs(&sources, &targets, &device).unwrap();
            let bag = Args::new().with("x", features(n, 2, &device));
            let propagator = ChainPropagator::new(DefaultChain::default());

            let ok = propagator.propagate(Some(&adj), Some(&adj), Some([n, n]), Some([n, n]), &bag);
            prop_assert!(ok.is_ok());

            let shrunk = if shrink_source { [n - 1, n] } else { [n, n - 1] };
            let err = propagator
                .propagate(Some(&adj), Some(&adj), Some([n, n]), Some(shrunk), &bag)
                .unwrap_err();
            prop_assert!(err.is_size_mismatch());
        }
    }
}

mod reduction_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn empty_endpoints_are_zero(
            (n, edges) in arb_graph(),
        ) {
            let device = Device::Cpu;
            let (sources, targets) = split(&edges);
            let index = Tensor::from_vec(
                targets.iter().map(|&t| t as u32).collect::<Vec<_>>(),
                targets.len(),
                &device,
            )
            .unwrap();
            let src = features(n, 2, &device)
                .index_select(
                    &Tensor::from_vec(
                        sources.iter().map(|&s| s as u32).collect::<Vec<_>>(),
                        sources.len(),
                        &device,
                    )
                    .unwrap(),
                    0,
                )
                .unwrap();

            for reduce in [Aggregation::Add, Aggregation::Mean, Aggregation::Max] {
                let out = scatter(&src, &index, 0, Some(n), reduce).unwrap();
                let rows = out.to_vec2::<f32>().unwrap();
                for (cell, row) in rows.iter().enumerate() {
                    prop_assert!(row.iter().all(|v| v.is_finite()));
                    if !targets.contains(&cell) {
                        prop_assert!(row.iter().all(|&v| v == 0.0));
                    }
                }
            }
        }

        #[test]
        fn segment_agrees_with_scatter_on_sorted_index(
            counts in prop::collection::vec(0usize..4, 1..6),
        ) {
            let device = Device::Cpu;
            let mut ptr = vec![0usize];
            let mut index = Vec::new();
            for (cell, &c) in counts.iter().enumerate() {
                ptr.push(ptr[cell] + c);
                index.extend(std::iter::repeat(cell as u32).take(c));
            }
            let e = index.len();
            let src = features(e, 3, &device);
            let index = Tensor::from_vec(index, e, &device).unwrap();

            for reduce in [Aggregation::Add, Aggregation::Mean, Aggregation::Max] {
                let a = scatter(&src, &index, 0, Some(counts.len()), reduce).unwrap();
                let b = segment_csr_ptr(&src, &ptr, 0, reduce).unwrap();
                let (a, b) = (a.to_vec2::<f32>().unwrap(), b.to_vec2::<f32>().unwrap());
                for (va, vb) in a.iter().flatten().zip(b.iter().flatten()) {
                    prop_assert!((va - vb).abs() < 1e-4, "{:?}: {} vs {}", reduce, va, vb);
                }
            }
        }
    }
}

mod fused_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn fused_sparse_equals_separate_explicit(
            (n, edges) in arb_graph(),
            d in 1usize..4,
        ) {
            let device = Device::Cpu;
            let (sources, targets) = split(&edges);
            let explicit = Adjacency::from_pairs(&sources, &targets, &device).unwrap();
            let Adjacency::Index(edge_index) = &explicit else { unreachable!() };
            let sparse: Adjacency =
                SparseAdjacency::from_edge_index(edge_index, [n, n], None).unwrap().into();
            let bag = Args::new().with("x", features(n, d, &device));

            let fused = ChainPropagator::new(FusedSum(ChainConfig::default()));
            let separate = ChainPropagator::new(DefaultChain::default());

            let a = fused
                .propagate(Some(&sparse), Some(&sparse), None, None, &bag)
                .unwrap();
            let b = separate
                .propagate(Some(&explicit), Some(&explicit), Some([n, n]), Some([n, n]), &bag)
                .unwrap();

            let a = a.to_vec2::<f32>().unwrap();
            let b = b.to_vec2::<f32>().unwrap();
            for (ra, rb) in a.iter().zip(&b) {
                for (va, vb) in ra.iter().zip(rb) {
                    prop_assert!((va - vb).abs() < 1e-4, "{} vs {}", va, vb);
                }
            }
        }
    }
}
