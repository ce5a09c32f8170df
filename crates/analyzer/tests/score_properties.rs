use biomethod_analyzer::ReproducibilityChecker;
use biomethod_protocol::{
    AnalysisResult, Category, Evidence, IssueCategory, ParamValue, Parameters, Position,
    ToolUsage,
};
use proptest::prelude::*;
use std::collections::HashSet;

fn category() -> impl Strategy<Value = Category> {
    prop_oneof![
        Just(Category::Alignment),
        Just(Category::SingleCell),
        Just(Category::Statistics),
        Just(Category::Visualization),
        Just(Category::Unknown),
    ]
}

fn parameter() -> impl Strategy<Value = (String, ParamValue)> {
    (
        prop_oneof![Just("-o"), Just("seed"), Just("--input"), Just("-t")],
        prop_oneof![
            Just(ParamValue::text("out.bam")),
            Just(ParamValue::text("/home/alice/ref.fa")),
            Just(ParamValue::text("SRR1234567")),
            Just(ParamValue::Integer(4)),
            Just(ParamValue::placeholder("<variable>")),
        ],
    )
        .prop_map(|(key, value)| (key.to_string(), value))
}

fn tool() -> impl Strategy<Value = ToolUsage> {
    (
        prop_oneof![Just("samtools"), Just("scanpy"), Just("bwa"), Just("seaborn")],
        proptest::option::of(prop_oneof![Just("1.17"), Just("0.7.17")]),
        category(),
        proptest::collection::vec(parameter(), 0..4),
        1usize..200,
    )
        .prop_map(|(name, version, category, params, line)| {
            ToolUsage::new(name, "run.py", Position::Line(line), Evidence::ShellCommand)
                .with_version(version.map(str::to_string))
                .with_category(category)
                .with_parameters(params.into_iter().collect::<Parameters>())
        })
}

fn analysis() -> impl Strategy<Value = AnalysisResult> {
    (
        proptest::collection::vec(tool(), 0..12),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(tools, manifest, vcs)| {
            let mut result = AnalysisResult {
                tools,
                ..Default::default()
            };
            if manifest {
                result.environment.manifest_files.push("environment.yml".to_string());
            }
            if vcs {
                result.environment.vcs_root = Some("/repo".to_string());
            }
            result
        })
}

proptest! {
    #[test]
    fn score_stays_in_range(result in analysis()) {
        let report = ReproducibilityChecker::new().evaluate(&result);
        prop_assert!((0.0..=100.0).contains(&report.score));
        prop_assert_eq!(report.checklist.len(), 10);
    }

    #[test]
    fn full_score_means_every_check_passed(result in analysis()) {
        let report = ReproducibilityChecker::new().evaluate(&result);
        let all_passed = report.checklist.values().all(|ok| *ok);
        prop_assert_eq!((report.score - 100.0).abs() < 1e-9, all_passed);
    }

    #[test]
    fn one_version_issue_per_unversioned_fact(result in analysis()) {
        let report = ReproducibilityChecker::new().evaluate(&result);
        let issues = report
            .issues
            .iter()
            .filter(|issue| issue.category == IssueCategory::Version)
            .count();
        let unversioned = result.tools.iter().filter(|t| !t.has_version()).count();
        prop_assert_eq!(issues, unversioned);
    }

    #[test]
    fn unique_tools_are_distinct(result in analysis()) {
        let unique = result.unique_tools();
        prop_assert!(unique.len() <= result.tools.len());
        let keys: HashSet<_> = unique
            .iter()
            .map(|t| (t.name.as_str(), t.version.as_deref()))
            .collect();
        prop_assert_eq!(keys.len(), unique.len());
        for tool in &result.tools {
            prop_assert!(keys.contains(&(tool.name.as_str(), tool.version.as_deref())));
        }
    }
}
