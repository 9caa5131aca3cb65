#![cfg(test)]

use phasemark::selection::{instruction_weights, normalize, region_profiles, uniform_weights};
use phasemark::{
    BlockMap, ClusterSelection, Criterion, Error, LinfaBackend, MarkerConfig, MarkerEngine,
    MarkerTable, PassInput, RegionAggregator, SelectionConfig, SelectionEngine, StaticInfo,
    TraceTable, weighted_profiles,
};

const TRACE: &str = std::include_str!("./fixtures/trace.csv");
const STATIC_INFO: &str = std::include_str!("./fixtures/static_info.txt");

fn silhouette(min: usize, max: usize) -> SelectionConfig {
    SelectionConfig {
        min_clusters: min,
        max_clusters: max,
        ..SelectionConfig::default()
    }
}

fn select(trace: &str, info: &str, config: SelectionConfig) -> Result<ClusterSelection, Error> {
    let table: TraceTable = trace.parse()?;
    let info: StaticInfo = info.parse()?;
    let blocks = BlockMap::from_table(&table);
    let aggregator = RegionAggregator::new(&table, &blocks);
    let profiles = weighted_profiles(&aggregator, &info)?;
    SelectionEngine::new(LinfaBackend::default(), config).select(&profiles)
}

/// `regions` regions split into two halves: the first half runs only the loop over
/// blocks 1 and 2, the second half only the loop over blocks 3 and 4
fn two_phase_trace(regions: u32) -> String {
    let mut trace = String::from("type,region,thread,data\n");
    for region in 0..regions {
        let (ids, counts) = if region < regions / 2 {
            ("1,2", "50,5")
        } else {
            ("3,4", "4,60")
        };
        trace.push_str(&format!("bb_id,{region},0,{ids}\nbbv,{region},0,{counts}\n"));
    }
    trace
}

const TWO_PHASE_INFO: &str = "[0:main] [1:a:3] [2:b:5]\n[1:work] [3:c:2] [4:d:7]";

#[test]
fn fixture_splits_into_its_two_phases() {
    let selection = select(TRACE, STATIC_INFO, silhouette(2, 3)).unwrap();

    assert_eq!(selection.num_clusters, 2);
    let labels = &selection.labels;
    assert_eq!(labels[0], labels[1]);
    assert_eq!(labels[0], labels[4]);
    assert_eq!(labels[2], labels[3]);
    assert_eq!(labels[2], labels[5]);
    assert_ne!(labels[0], labels[2]);

    assert_eq!(selection.weights().sum::<usize>(), 6);
    assert!(selection.empty_clusters.is_empty());
    for cluster in &selection.clusters {
        let representative = cluster.representative.unwrap();
        assert!(cluster.members.contains(&representative));
    }
}

#[test]
fn separated_behaviours_are_found() {
    let trace = two_phase_trace(8);
    for criterion in [Criterion::Silhouette, Criterion::Bic] {
        let config = SelectionConfig {
            criterion,
            ..silhouette(2, 4)
        };
        let selection = select(&trace, TWO_PHASE_INFO, config).unwrap();

        assert_eq!(selection.num_clusters, 2);
        assert_eq!(selection.scores.len(), 3);
        for (region, &label) in selection.labels.iter().enumerate() {
            assert_eq!(label == selection.labels[0], region < 4);
        }
        let weights: Vec<_> = selection.weights().collect();
        assert_eq!(weights, vec![4, 4]);
        assert_eq!(weights.iter().sum::<usize>(), 8);
    }
}

#[test]
fn reduced_dimensions_keep_the_split() {
    let trace = two_phase_trace(10);
    let config = SelectionConfig {
        reduced_dimensions: Some(2),
        keep_transformed: true,
        ..silhouette(2, 2)
    };
    let selection = select(&trace, TWO_PHASE_INFO, config).unwrap();

    let transformed = selection.transformed.as_ref().unwrap();
    assert_eq!(transformed.len(), 10);
    assert!(transformed.iter().all(|row| row.len() == 2));
    assert_eq!(selection.labels[0], selection.labels[4]);
    assert_ne!(selection.labels[0], selection.labels[5]);
    assert_eq!(selection.labels[5], selection.labels[9]);
}

#[test]
fn bic_scores_every_candidate() {
    let trace = two_phase_trace(8);
    let config = SelectionConfig {
        criterion: Criterion::Bic,
        ..silhouette(1, 4)
    };
    let selection = select(&trace, TWO_PHASE_INFO, config).unwrap();

    let tried: Vec<_> = selection.scores.iter().map(|&(k, _)| k).collect();
    assert_eq!(tried, vec![1, 2, 3, 4]);
    let best = selection
        .scores
        .iter()
        .map(|&(_, score)| score)
        .fold(f64::INFINITY, f64::min);
    let chosen = selection
        .scores
        .iter()
        .find(|&&(k, _)| k == selection.num_clusters)
        .map(|&(_, score)| score);
    assert_eq!(chosen, Some(best));
}

#[test]
fn missing_static_info_is_not_found() {
    let err = select(TRACE, "[0:main] [10:entry:4]", silhouette(2, 2)).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn zero_weight_region_is_rejected() {
    let info = "[0:main] [10:entry:0] [11:if.then:0]\n[1:kernel] [12:for.cond:2] [13:for.body:6]";
    let err = select(TRACE, info, silhouette(2, 2)).unwrap_err();
    assert!(matches!(err, Error::NormalizationError(_)));
}

#[test]
fn too_many_clusters_is_rejected() {
    let err = select(TRACE, STATIC_INFO, silhouette(2, 7)).unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
}

#[test]
fn uniform_weights_give_execution_shares() {
    let table: TraceTable = TRACE.parse().unwrap();
    let blocks = BlockMap::from_table(&table);
    let aggregator = RegionAggregator::new(&table, &blocks);
    let profiles = region_profiles(&aggregator).unwrap();
    assert_eq!(profiles[0].as_slice(), &[43, 2, 1, 0]);

    let matrix = normalize(&profiles, &uniform_weights(&blocks)).unwrap();
    assert_eq!(matrix.dim(), (6, 4));
    for row in matrix.rows() {
        assert!((row.sum() - 1.0).abs() < 1e-12);
    }

    let info: StaticInfo = STATIC_INFO.parse().unwrap();
    assert_eq!(
        instruction_weights(&blocks, &info).unwrap(),
        vec![4.0, 8.0, 2.0, 6.0]
    );
}

fn fixture_markers(table: &TraceTable) -> MarkerTable {
    let blocks = BlockMap::from_table(table);
    let aggregator = RegionAggregator::new(table, &blocks);
    let config = MarkerConfig {
        num_warmup_regions: 1,
        grace_percentage: 0.9,
        region_length: 100,
    };
    MarkerEngine::new(&aggregator, config)
        .unwrap()
        .form_all_markers()
        .unwrap()
}

#[test]
fn pass_input_for_fixture_regions() {
    let table: TraceTable = TRACE.parse().unwrap();
    let info: StaticInfo = STATIC_INFO.parse().unwrap();
    let markers = fixture_markers(&table);

    let first = PassInput::for_region(&markers, &info, 0).unwrap();
    assert_eq!(first.to_csv_line(), "0,0,0,0,0,0,0,10,43");

    let third = PassInput::for_region(&markers, &info, 2).unwrap();
    assert_eq!(third.as_tuple(), (0, 10, 43, 0, 11, 3, 1, 12, 5));
}

#[test]
fn pipeline_is_deterministic() {
    let run = || {
        let table: TraceTable = TRACE.parse().unwrap();
        let markers = fixture_markers(&table);
        let selection = select(TRACE, STATIC_INFO, silhouette(2, 3)).unwrap();
        (markers, selection)
    };
    let (first_markers, first_selection) = run();
    let (second_markers, second_selection) = run();
    assert_eq!(first_markers, second_markers);
    assert_eq!(first_selection, second_selection);
}
