//! Integration tests for the pattern index.

use metadex::index::PatternIndex;
use metadex::{MatchKind, Pattern, SHARED_ORG};

fn populate() -> PatternIndex {
    let mut idx = PatternIndex::new();
    let dcs = ["east", "west"];
    let roles = ["web", "db", "cache"];
    let metrics = ["cpu.idle", "cpu.user", "mem.free", "disk.sda.io"];

    for (d, dc) in dcs.iter().enumerate() {
        for role in roles {
            for host in 0..5 {
                for metric in metrics {
                    let org = if d == 0 { 1 } else { 2 };
                    let name = format!("{dc}.{role}{host}.{metric}");
                    let id = idx.get_or_add(org, &name);
                    idx.add_ref(org, id);
                }
            }
        }
    }
    for metric in metrics {
        let name = format!("litmus.probe.{metric}");
        let id = idx.get_or_add(SHARED_ORG, &name);
        idx.add_ref(SHARED_ORG, id);
    }
    idx
}

const PATTERNS: &[&str] = &[
    "east.web1.cpu.idle",
    "east.web1.*",
    "*.cpu.idle",
    "east.*.cpu.*",
    "west.db?.mem.free",
    "*.{web,cache}3.disk.*",
    "east.[wd]*.cpu.user",
    "litmus.*",
    "*probe*",
    "*.nothing.*",
    "*",
];

#[test]
fn test_get_or_add_idempotent_across_orgs() {
    let mut idx = populate();
    let before = idx.len();
    for org in [1, 2, SHARED_ORG] {
        for id in idx.list(org) {
            let name = idx.name(id).unwrap().to_string();
            let owner_id = idx.get(1, &name).or(idx.get(2, &name)).or(idx.get(SHARED_ORG, &name));
            assert_eq!(owner_id, Some(id));
        }
    }
    let again = idx.get_or_add(1, "east.web0.cpu.idle");
    assert_eq!(idx.get(1, "east.web0.cpu.idle"), Some(again));
    assert_eq!(idx.len(), before);
}

#[test]
fn test_prune_has_no_false_negatives() {
    let mut idx = populate();

    let before: Vec<_> = PATTERNS
        .iter()
        .flat_map(|p| [1, 2, 3, SHARED_ORG].map(|org| idx.find(org, p)))
        .collect();

    let pruned = idx.prune(0.20);
    assert!(pruned > 0, "expected common trigrams such as 'cpu' to be pruned");

    let after: Vec<_> = PATTERNS
        .iter()
        .flat_map(|p| [1, 2, 3, SHARED_ORG].map(|org| idx.find(org, p)))
        .collect();

    assert_eq!(before, after);
}

#[test]
fn test_prefix_matches_agree_with_full_scan() {
    let idx = populate();
    for pattern in ["east.*", "west.cache4.*", "litmus.probe.*", "*"] {
        let (kind, globs) = idx.find(1, pattern);
        assert_eq!(kind, MatchKind::Prefix);

        let regex = Pattern::parse(pattern).to_regex().unwrap();
        let expected: Vec<_> = idx
            .list(1)
            .into_iter()
            .filter(|&id| regex.is_match(idx.name(id).unwrap()))
            .collect();

        let mut got: Vec<_> = globs.iter().map(|g| g.id).collect();
        got.sort_unstable();
        assert_eq!(got, expected, "pattern {pattern}");
    }
}

#[test]
fn test_match_counts() {
    let idx = populate();

    assert_eq!(idx.find(1, "east.web1.cpu.idle").1.len(), 1);
    assert_eq!(idx.find(2, "east.web1.cpu.idle").1.len(), 0);
    // 15 hosts per dc plus the shared probe
    assert_eq!(idx.find(1, "*.cpu.idle").1.len(), 16);
    assert_eq!(idx.find(SHARED_ORG, "*.cpu.idle").1.len(), 31);
    // shared probes are visible everywhere
    assert_eq!(idx.find(2, "litmus.*").1.len(), 4);
    assert_eq!(idx.find(3, "*").1.len(), 4);
    assert_eq!(idx.find(1, "*.{web,cache}3.disk.*").1.len(), 2);
    assert!(idx.find(1, "*.nothing.*").1.is_empty());
}

#[test]
fn test_list_has_no_duplicates() {
    let idx = populate();
    let mut ids = idx.list(1);
    let len = ids.len();
    ids.dedup();
    assert_eq!(ids.len(), len);
    assert_eq!(len, 60 + 4);
    assert_eq!(idx.list(SHARED_ORG).len(), idx.len());
}
