use private_lift::{
    engine::{PlainSecret, PlaintextEngine, SharePair, Visibility},
    game::{Error, LiftAggregationGame, Stage},
    mapper::{self, ShapeError},
    metrics::{GroupedLiftMetrics, HIDDEN_METRIC, LiftMetrics},
};
use proptest::prelude::*;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn encode(
    engine: &mut PlaintextEngine,
    record: &GroupedLiftMetrics<i64>,
) -> GroupedLiftMetrics<SharePair<PlainSecret>> {
    record.clone().map(|v| engine.share(v))
}

/// Field-wise plaintext rendition of the protocol, used as the reference for
/// the secure pipeline's output.
fn expected_output(records: &[GroupedLiftMetrics<i64>], threshold: i64) -> GroupedLiftMetrics<i64> {
    let gate = |block: LiftMetrics<i64>| {
        if block.test_converters.wrapping_add(block.control_converters) >= threshold {
            block
        } else {
            LiftMetrics {
                test_population: block.test_population,
                control_population: block.control_population,
                ..LiftMetrics::from([HIDDEN_METRIC; 16])
            }
        }
    };
    let subgroup_count = records[0].subgroups.len();
    let mut sums = mapper::flatten(records[0].clone());
    for record in &records[1..] {
        for (sum, field) in sums.iter_mut().zip(mapper::flatten(record.clone())) {
            *sum = sum.wrapping_add(field);
        }
    }
    let summed = mapper::unflatten(sums, subgroup_count).unwrap();
    let mut result = GroupedLiftMetrics {
        metrics: gate(summed.metrics),
        subgroups: summed.subgroups.into_iter().map(gate).collect(),
    };
    result.metrics.test_squared = HIDDEN_METRIC;
    result.metrics.control_squared = HIDDEN_METRIC;
    for subgroup in &mut result.subgroups {
        subgroup.test_squared = HIDDEN_METRIC;
        subgroup.control_squared = HIDDEN_METRIC;
    }
    result
}

fn record_a() -> GroupedLiftMetrics<i64> {
    GroupedLiftMetrics {
        metrics: LiftMetrics {
            test_population: 500,
            control_population: 500,
            test_converters: 40,
            control_converters: 30,
            test_value: 1000,
            control_value: 800,
            test_squared: 99,
            ..LiftMetrics::default()
        },
        subgroups: vec![],
    }
}

fn record_b() -> GroupedLiftMetrics<i64> {
    GroupedLiftMetrics {
        metrics: LiftMetrics {
            test_population: 300,
            control_population: 300,
            test_converters: 10,
            control_converters: 5,
            test_value: 200,
            control_value: 100,
            test_squared: 5,
            ..LiftMetrics::default()
        },
        subgroups: vec![],
    }
}

#[tokio::test]
async fn hides_all_but_populations_below_threshold() {
    init_tracing();
    let mut engine = PlaintextEngine::new(2);
    let input_a = encode(&mut engine, &record_a());
    let input_b = encode(&mut engine, &record_b());
    let mut game = LiftAggregationGame::new(engine, Visibility::Public).unwrap();

    // combined converters: (40 + 10) + (30 + 5) = 85 < 100
    let result = game.play(vec![input_a, input_b]).await.unwrap();
    let expected = GroupedLiftMetrics {
        metrics: LiftMetrics {
            test_population: 800,
            control_population: 800,
            ..LiftMetrics::from([HIDDEN_METRIC; 16])
        },
        subgroups: vec![],
    };
    assert_eq!(result, expected);
}

#[tokio::test]
async fn exposes_summed_metrics_at_exact_threshold() {
    init_tracing();
    let mut above = record_a();
    // combined converters: (55 + 10) + (30 + 5) = 100 >= 100
    above.metrics.test_converters = 55;

    let mut engine = PlaintextEngine::new(2);
    let input_a = encode(&mut engine, &above);
    let input_b = encode(&mut engine, &record_b());
    let mut game = LiftAggregationGame::new(engine, Visibility::Public).unwrap();

    let result = game.play(vec![input_a, input_b]).await.unwrap();
    let expected = GroupedLiftMetrics {
        metrics: LiftMetrics {
            test_population: 800,
            control_population: 800,
            test_converters: 65,
            control_converters: 35,
            test_value: 1200,
            control_value: 900,
            // redacted unconditionally, even though the block is exposed
            test_squared: HIDDEN_METRIC,
            control_squared: HIDDEN_METRIC,
            ..LiftMetrics::default()
        },
        subgroups: vec![],
    };
    assert_eq!(result, expected);
}

#[tokio::test]
async fn gates_each_block_independently() {
    let exposed_block = LiftMetrics {
        test_population: 600,
        control_population: 600,
        test_converters: 80,
        control_converters: 40,
        test_conversions: 150,
        control_conversions: 70,
        test_squared: 12345,
        ..LiftMetrics::default()
    };
    let hidden_block = LiftMetrics {
        test_population: 90,
        control_population: 80,
        test_converters: 30,
        control_converters: 20,
        test_conversions: 33,
        control_conversions: 21,
        ..LiftMetrics::default()
    };
    let record = GroupedLiftMetrics {
        metrics: exposed_block,
        subgroups: vec![hidden_block, exposed_block],
    };

    let mut engine = PlaintextEngine::new(2);
    let zero = GroupedLiftMetrics {
        metrics: LiftMetrics::default(),
        subgroups: vec![LiftMetrics::default(); 2],
    };
    let input_a = encode(&mut engine, &record);
    let input_b = encode(&mut engine, &zero);
    let mut game = LiftAggregationGame::new(engine, Visibility::Public).unwrap();

    let result = game.play(vec![input_a, input_b]).await.unwrap();
    assert_eq!(result, expected_output(&[record, zero], 100));
    // the aggregate block and the second subgroup are exposed
    assert_eq!(result.metrics.test_conversions, 150);
    assert_eq!(result.subgroups[1].test_conversions, 150);
    // the first subgroup misses the threshold: populations only
    assert_eq!(result.subgroups[0].test_population, 90);
    assert_eq!(result.subgroups[0].control_population, 80);
    assert_eq!(result.subgroups[0].test_conversions, HIDDEN_METRIC);
    assert_eq!(result.subgroups[0].test_converters, HIDDEN_METRIC);
    // squared accumulators never leave the secure boundary
    assert_eq!(result.metrics.test_squared, HIDDEN_METRIC);
    assert_eq!(result.subgroups[1].test_squared, HIDDEN_METRIC);
}

#[tokio::test]
async fn rejects_mismatched_shapes_before_any_engine_operation() {
    let with_subgroups = |n: usize| GroupedLiftMetrics {
        metrics: LiftMetrics::default(),
        subgroups: vec![LiftMetrics::<i64>::default(); n],
    };
    let mut engine = PlaintextEngine::new(2);
    let input_a = encode(&mut engine, &with_subgroups(1));
    let input_b = encode(&mut engine, &with_subgroups(2));
    let mut game = LiftAggregationGame::new(engine, Visibility::Public).unwrap();

    let err = game.play(vec![input_a, input_b]).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Shape(ShapeError::SubgroupMismatch {
            expected: 1,
            actual: 2
        })
    ));
    assert_eq!(game.into_engine().ops_issued(), 0);
}

#[tokio::test]
async fn rejects_empty_input_batch() {
    let engine = PlaintextEngine::new(2);
    let mut game = LiftAggregationGame::new(engine, Visibility::Public).unwrap();
    let err = game.play(vec![]).await.unwrap_err();
    assert!(matches!(err, Error::Shape(ShapeError::Empty)));
    assert_eq!(game.into_engine().ops_issued(), 0);
}

#[test]
fn rejects_invalid_configuration_at_construction() {
    let err = LiftAggregationGame::with_threshold(
        PlaintextEngine::new(2),
        Visibility::Public,
        -1,
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidThreshold(-1)));

    let err = LiftAggregationGame::new(PlaintextEngine::new(2), Visibility::Party(2)).unwrap_err();
    assert!(matches!(
        err,
        Error::UnknownParty {
            party: 2,
            parties: 2
        }
    ));

    assert!(LiftAggregationGame::new(PlaintextEngine::new(2), Visibility::Party(1)).is_ok());
    assert!(
        LiftAggregationGame::with_threshold(PlaintextEngine::new(2), Visibility::Public, 0)
            .is_ok()
    );
}

#[tokio::test]
async fn reveals_to_a_single_party_scope() {
    let mut engine = PlaintextEngine::new(3);
    let input_a = encode(&mut engine, &record_a());
    let input_b = encode(&mut engine, &record_b());
    let mut game = LiftAggregationGame::new(engine, Visibility::Party(1)).unwrap();
    assert_eq!(game.visibility(), Visibility::Party(1));

    let result = game.play(vec![input_a, input_b]).await.unwrap();
    assert_eq!(result, expected_output(&[record_a(), record_b()], 100));
}

#[tokio::test]
async fn surfaces_engine_faults_with_the_failing_stage() {
    let mut engine = PlaintextEngine::new(2);
    let input_a = encode(&mut engine, &record_a());
    let input_b = encode(&mut engine, &record_b());
    // xor/add/select still succeed locally, only the reveal needs the session
    engine.close_session();
    let mut game = LiftAggregationGame::new(engine, Visibility::Public).unwrap();

    let err = game.play(vec![input_a, input_b]).await.unwrap_err();
    match err {
        Error::Engine { stage, source } => {
            assert_eq!(stage, Stage::Reveal);
            assert_eq!(source.to_string(), "no interactive session available");
        }
        other => panic!("expected an engine fault, got {other:?}"),
    }
}

fn arbitrary_block(max: i64) -> impl Strategy<Value = LiftMetrics<i64>> {
    prop::array::uniform16(0..max).prop_map(LiftMetrics::from)
}

fn arbitrary_records(
    parties: usize,
    subgroups: usize,
) -> impl Strategy<Value = Vec<GroupedLiftMetrics<i64>>> {
    let record = (
        arbitrary_block(1000),
        prop::collection::vec(arbitrary_block(1000), subgroups..=subgroups),
    )
        .prop_map(|(metrics, subgroups)| GroupedLiftMetrics { metrics, subgroups });
    prop::collection::vec(record, parties..=parties)
}

async fn play_public(
    records: &[GroupedLiftMetrics<i64>],
    threshold: i64,
) -> GroupedLiftMetrics<i64> {
    let mut engine = PlaintextEngine::new(records.len().max(2));
    let inputs = records.iter().map(|r| encode(&mut engine, r)).collect();
    let mut game =
        LiftAggregationGame::with_threshold(engine, Visibility::Public, threshold).unwrap();
    game.play(inputs).await.unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn matches_the_plaintext_reference(
        records in (2usize..5, 0usize..3).prop_flat_map(|(p, s)| arbitrary_records(p, s)),
        threshold in 0i64..200,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let result = rt.block_on(play_public(&records, threshold));
        prop_assert_eq!(result, expected_output(&records, threshold));
    }

    #[test]
    fn aggregation_is_order_independent(
        records in (2usize..5, 0usize..3).prop_flat_map(|(p, s)| arbitrary_records(p, s)),
        rotate_by in 0usize..5,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let result = rt.block_on(play_public(&records, 100));

        let mut permuted = records;
        let rotate_by = rotate_by % permuted.len();
        permuted.rotate_left(rotate_by);
        let permuted_result = rt.block_on(play_public(&permuted, 100));

        prop_assert_eq!(result, permuted_result);
    }
}
