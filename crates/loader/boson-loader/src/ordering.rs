//! Driver ordering policy.
//!
//! A policy is a comma-separated list of directives applied left to right:
//!
//! - `N` selects the driver at position `N` of the discovered list.
//! - `CATEGORY` selects every driver in that category's bucket, in
//!   discovery order.
//! - `CATEGORY:N` selects the `N`-th driver (zero-based, discovery order)
//!   of that bucket.
//!
//! Category keywords are `DISCRETE_GPU_ONLY`, `INTEGRATED_GPU_ONLY`, `GPU`,
//! and `NPU`, matched case-sensitively. `NPU` and `OTHER` drivers share one
//! bucket, so `NPU` selects both. Mixed drivers have no keyword and can only
//! be placed by global index.
//!
//! Whitespace around the whole string, each token, and the colon is
//! ignored. Tokens that do not parse, name an unknown category, or index
//! past the end are dropped without error. A driver placed by an earlier
//! directive is never moved by a later one, and every driver no directive
//! placed follows in discovery order.

use boson_driver_api::DriverCategory;

/// Characters trimmed around tokens.
const WHITESPACE: &[char] = &[' ', '\t', '\n', '\r', '\x0b', '\x0c'];

/// Selection bucket a category keyword refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// `DISCRETE_GPU_ONLY`
    DiscreteGpu,
    /// `INTEGRATED_GPU_ONLY`
    IntegratedGpu,
    /// `GPU`
    Gpu,
    /// `NPU`, which also holds `OTHER` drivers.
    NpuOrOther,
}

impl Bucket {
    /// Parses a category keyword.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "DISCRETE_GPU_ONLY" => Some(Self::DiscreteGpu),
            "INTEGRATED_GPU_ONLY" => Some(Self::IntegratedGpu),
            "GPU" => Some(Self::Gpu),
            "NPU" => Some(Self::NpuOrOther),
            _ => None,
        }
    }

    /// The bucket a driver of `category` falls into, if any.
    pub const fn of(category: DriverCategory) -> Option<Self> {
        match category {
            DriverCategory::DiscreteGpu => Some(Self::DiscreteGpu),
            DriverCategory::IntegratedGpu => Some(Self::IntegratedGpu),
            DriverCategory::Gpu => Some(Self::Gpu),
            DriverCategory::Npu | DriverCategory::Other => Some(Self::NpuOrOther),
            DriverCategory::Mixed => None,
        }
    }
}

/// One parsed policy token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Position in the discovered list.
    Global(u32),
    /// Every driver in a bucket.
    Category(Bucket),
    /// The `n`-th driver of a bucket.
    CategoryIndex(Bucket, u32),
}

fn parse_index(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Parses one token; `None` for anything malformed.
pub fn parse_directive(token: &str) -> Option<Directive> {
    let token = token.trim_matches(WHITESPACE);
    if token.is_empty() {
        return None;
    }
    if let Some((kind, index)) = token.split_once(':') {
        let bucket = Bucket::from_keyword(kind.trim_matches(WHITESPACE))?;
        let index = parse_index(index.trim_matches(WHITESPACE))?;
        return Some(Directive::CategoryIndex(bucket, index));
    }
    if let Some(index) = parse_index(token) {
        return Some(Directive::Global(index));
    }
    Bucket::from_keyword(token).map(Directive::Category)
}

/// Parses a whole policy, dropping tokens that do not parse.
pub fn parse_policy(policy: &str) -> Vec<Directive> {
    policy
        .trim_matches(WHITESPACE)
        .split(',')
        .filter_map(|token| {
            let directive = parse_directive(token);
            if directive.is_none() && !token.trim_matches(WHITESPACE).is_empty() {
                log::debug!("ignoring driver ordering token {token:?}");
            }
            directive
        })
        .collect()
}

fn bucket_members(categories: &[DriverCategory], bucket: Bucket) -> impl Iterator<Item = usize> + '_ {
    categories
        .iter()
        .enumerate()
        .filter(move |(_, c)| Bucket::of(**c) == Some(bucket))
        .map(|(i, _)| i)
}

/// Computes the output order for drivers of the given categories.
///
/// Returns a permutation of `0..categories.len()`: element `k` is the
/// discovery position of the driver that ends up at position `k`.
pub fn resolve_order(categories: &[DriverCategory], policy: &str) -> Vec<usize> {
    let count = categories.len();
    let mut placed = vec![false; count];
    let mut order = Vec::with_capacity(count);

    let mut place = |index: usize, order: &mut Vec<usize>| {
        if !placed[index] {
            placed[index] = true;
            order.push(index);
        }
    };

    for directive in parse_policy(policy) {
        match directive {
            Directive::Global(n) => match usize::try_from(n) {
                Ok(n) if n < count => place(n, &mut order),
                _ => log::debug!("driver ordering: index {n} out of range"),
            },
            Directive::Category(bucket) => {
                for index in bucket_members(categories, bucket) {
                    place(index, &mut order);
                }
            }
            Directive::CategoryIndex(bucket, n) => {
                let nth = usize::try_from(n).ok().and_then(|n| bucket_members(categories, bucket).nth(n));
                match nth {
                    Some(index) => place(index, &mut order),
                    None => log::debug!("driver ordering: {bucket:?}:{n} out of range"),
                }
            }
        }
    }

    for index in 0..count {
        place(index, &mut order);
    }
    order
}

/// Reorders `drivers` according to `policy`.
pub fn order_by_policy<T>(
    drivers: Vec<T>,
    policy: &str,
    category_of: impl Fn(&T) -> DriverCategory,
) -> Vec<T> {
    let categories: Vec<_> = drivers.iter().map(&category_of).collect();
    let order = resolve_order(&categories, policy);
    let mut slots: Vec<Option<T>> = drivers.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}
