//! Property tests for the ordering engine and device numbering.

use boson_core::{DeviceId, DriverIndex};
use boson_driver_api::{DeviceHandle, DriverCategory};
use boson_loader::handles::DeviceHandleTable;
use boson_loader::ordering::{Bucket, Directive, parse_policy, resolve_order};
use proptest::prelude::*;

fn arb_category() -> impl Strategy<Value = DriverCategory> {
    prop_oneof![
        Just(DriverCategory::DiscreteGpu),
        Just(DriverCategory::IntegratedGpu),
        Just(DriverCategory::Gpu),
        Just(DriverCategory::Npu),
        Just(DriverCategory::Other),
        Just(DriverCategory::Mixed),
    ]
}

fn arb_token() -> impl Strategy<Value = String> {
    let keyword = prop_oneof![
        Just("DISCRETE_GPU_ONLY"),
        Just("INTEGRATED_GPU_ONLY"),
        Just("GPU"),
        Just("NPU"),
        Just("MIXED"),
        Just("gpu"),
    ];
    prop_oneof![
        (0u32..12).prop_map(|n| n.to_string()),
        keyword.clone().prop_map(str::to_string),
        (keyword, 0u32..6).prop_map(|(k, n)| format!("{k}:{n}")),
        "[ A-Z:0-9]{0,8}",
    ]
}

fn arb_policy() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_token(), 0..8).prop_map(|tokens| tokens.join(","))
}

proptest! {
    /// Every driver appears exactly once, whatever the policy.
    #[test]
    fn order_is_a_permutation(
        categories in prop::collection::vec(arb_category(), 0..10),
        policy in arb_policy(),
    ) {
        let mut order = resolve_order(&categories, &policy);
        order.sort_unstable();
        prop_assert_eq!(order, (0..categories.len()).collect::<Vec<_>>());
    }

    /// Drivers no directive refers to keep their relative discovery order.
    #[test]
    fn untouched_drivers_keep_discovery_order(
        categories in prop::collection::vec(arb_category(), 0..10),
        policy in arb_policy(),
    ) {
        let directives = parse_policy(&policy);
        let touched = |i: usize| {
            directives.iter().any(|d| match d {
                Directive::Global(n) => usize::try_from(*n) == Ok(i),
                Directive::Category(b) | Directive::CategoryIndex(b, _) => {
                    Bucket::of(categories[i]) == Some(*b)
                }
            })
        };
        let order = resolve_order(&categories, &policy);
        let untouched: Vec<usize> = (0..categories.len()).filter(|i| !touched(*i)).collect();
        let seen: Vec<usize> = order.iter().copied().filter(|i| !touched(*i)).collect();
        prop_assert_eq!(seen, untouched);
    }

    /// A list of distinct valid indices puts exactly those drivers first.
    #[test]
    fn global_indices_project_then_keep_the_rest(
        (categories, picked) in prop::collection::vec(arb_category(), 0..10).prop_flat_map(|c| {
            let all: Vec<usize> = (0..c.len()).collect();
            let n = all.len();
            (Just(c), prop::sample::subsequence(all, 0..=n).prop_shuffle())
        }),
    ) {
        let policy = picked.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
        let order = resolve_order(&categories, &policy);
        prop_assert_eq!(&order[..picked.len()], picked.as_slice());
        let rest: Vec<usize> = (0..categories.len()).filter(|i| !picked.contains(i)).collect();
        prop_assert_eq!(&order[picked.len()..], rest.as_slice());
    }

    /// Tokens that cannot select anything change nothing.
    #[test]
    fn unusable_tokens_are_ignored(
        categories in prop::collection::vec(arb_category(), 0..10),
        policy in arb_policy(),
        before in prop::sample::select(vec!["10", "GPU:10", "NPU:", "GPU:abc", "bogus", "OTHER"]),
        after in prop::sample::select(vec!["99", "INVALID:SYNTAX", "::", "-1", "npu"]),
    ) {
        let noisy = format!("{before},{policy},{after}");
        prop_assert_eq!(resolve_order(&categories, &noisy), resolve_order(&categories, &policy));
    }

    /// An empty or whitespace-only policy keeps discovery order.
    #[test]
    fn blank_policy_is_identity(
        categories in prop::collection::vec(arb_category(), 0..10),
        blank in "[ \t,]{0,6}",
    ) {
        let order = resolve_order(&categories, &blank);
        prop_assert_eq!(order, (0..categories.len()).collect::<Vec<_>>());
    }

    /// Identifiers are dense and map back to the same handle.
    #[test]
    fn device_numbering_is_dense_and_stable(
        per_driver in prop::collection::vec(0usize..4, 0..5),
    ) {
        let mut next = 0usize;
        let lists: Vec<(DriverIndex, Vec<DeviceHandle>)> = per_driver
            .iter()
            .enumerate()
            .map(|(driver, count)| {
                let handles = (0..*count)
                    .filter_map(|_| {
                        next += 1;
                        DeviceHandle::from_raw(next * 0x1000)
                    })
                    .collect();
                (DriverIndex::new(u32::try_from(driver).unwrap()), handles)
            })
            .collect();
        let total: usize = per_driver.iter().sum();
        let table = DeviceHandleTable::build(lists.clone());
        prop_assert_eq!(table.len(), total);

        let flattened: Vec<DeviceHandle> = lists.into_iter().flat_map(|(_, l)| l).collect();
        for (raw, handle) in flattened.iter().enumerate() {
            let id = DeviceId::new(u32::try_from(raw).unwrap());
            prop_assert_eq!(table.to_handle(id), Some(*handle));
            prop_assert_eq!(table.to_identifier(*handle), id);
        }
        prop_assert!(table.to_handle(DeviceId::new(u32::try_from(total).unwrap())).is_none());
    }
}
