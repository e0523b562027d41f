//! Initial-point generators over the unit hypercube.
//!
//! Points are produced in `[0, 1)^d` and mapped onto the search space by
//! [`SearchSpace::from_unit`](tt_types::SearchSpace::from_unit).

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use tt_types::InitialPointGenerator;

/// Joe–Kuo direction numbers for Sobol dimensions 2..=10: (s, a, m).
const SOBOL_DIRECTIONS: [(u32, u32, &[u32]); 9] = [
    (1, 0, &[1]),
    (2, 1, &[1, 3]),
    (3, 1, &[1, 3, 1]),
    (3, 2, &[1, 1, 1]),
    (4, 1, &[1, 1, 3, 3]),
    (4, 4, &[1, 3, 5, 13]),
    (5, 2, &[1, 1, 5, 5, 17]),
    (5, 4, &[1, 1, 5, 5, 5]),
    (5, 7, &[1, 1, 7, 11, 19]),
];

const MAX_GRID_ENUMERATION: u64 = 100_000;

/// Generate `n` points of dimension `dims`.
pub fn generate<R: Rng + ?Sized>(
    generator: InitialPointGenerator,
    n: usize,
    dims: usize,
    rng: &mut R,
) -> Vec<Vec<f64>> {
    if n == 0 || dims == 0 {
        return vec![Vec::new(); n];
    }
    match generator {
        InitialPointGenerator::Random => (0..n)
            .map(|_| (0..dims).map(|_| rng.random::<f64>()).collect())
            .collect(),
        InitialPointGenerator::Lhs => latin_hypercube(n, dims, rng),
        InitialPointGenerator::Halton => (0..n).map(|i| halton(i + 1, dims, 0)).collect(),
        InitialPointGenerator::Hammersly => (0..n)
            .map(|i| {
                let mut point = Vec::with_capacity(dims);
                point.push((i as f64 + 0.5) / n as f64);
                point.extend(halton(i + 1, dims - 1, 0));
                point
            })
            .collect(),
        InitialPointGenerator::Sobol => sobol(n, dims, rng),
        InitialPointGenerator::Grid => grid(n, dims, rng),
    }
}

/// One stratum per point in every dimension, strata shuffled independently.
fn latin_hypercube<R: Rng + ?Sized>(n: usize, dims: usize, rng: &mut R) -> Vec<Vec<f64>> {
    let mut points = vec![Vec::with_capacity(dims); n];
    let mut strata: Vec<usize> = (0..n).collect();
    for _ in 0..dims {
        strata.shuffle(rng);
        for (point, stratum) in points.iter_mut().zip(&strata) {
            point.push((*stratum as f64 + rng.random::<f64>()) / n as f64);
        }
    }
    points
}

fn radical_inverse(mut index: usize, base: usize) -> f64 {
    let mut result = 0.0;
    let mut fraction = 1.0 / base as f64;
    while index > 0 {
        result += (index % base) as f64 * fraction;
        index /= base;
        fraction /= base as f64;
    }
    result
}

/// The Halton point at `index`, using primes starting from the `skip`-th.
fn halton(index: usize, dims: usize, skip: usize) -> Vec<f64> {
    primes(skip + dims)[skip..]
        .iter()
        .map(|base| radical_inverse(index, *base))
        .collect()
}

fn primes(count: usize) -> Vec<usize> {
    let mut found = Vec::with_capacity(count);
    let mut candidate = 2;
    while found.len() < count {
        if found.iter().all(|p| candidate % p != 0) {
            found.push(candidate);
        }
        candidate += 1;
    }
    found
}

fn sobol_directions(dim: usize) -> Option<[u32; 32]> {
    let mut v = [0u32; 32];
    if dim == 0 {
        for (k, slot) in v.iter_mut().enumerate() {
            *slot = 1 << (31 - k);
        }
        return Some(v);
    }
    let (s, a, m) = SOBOL_DIRECTIONS.get(dim - 1)?;
    let s = *s as usize;
    for k in 0..32 {
        v[k] = if k < s {
            m[k] << (31 - k)
        } else {
            let mut value = v[k - s] ^ (v[k - s] >> s);
            for j in 1..s {
                if (a >> (s - 1 - j)) & 1 == 1 {
                    value ^= v[k - j];
                }
            }
            value
        };
    }
    Some(v)
}

/// Gray-code Sobol sequence with a random digital shift per dimension.
/// Dimensions beyond the direction table continue as Halton coordinates.
fn sobol<R: Rng + ?Sized>(n: usize, dims: usize, rng: &mut R) -> Vec<Vec<f64>> {
    let tables: Vec<[u32; 32]> = (0..dims).map_while(sobol_directions).collect();
    let shifts: Vec<u32> = tables.iter().map(|_| rng.random()).collect();
    let mut state = vec![0u32; tables.len()];
    let scale = 1.0 / (1u64 << 32) as f64;

    (0..n)
        .map(|i| {
            // Skip the origin: advance from point i to point i + 1.
            let bit = (!(i as u32)).trailing_zeros() as usize;
            for (x, table) in state.iter_mut().zip(&tables) {
                *x ^= table[bit.min(31)];
            }
            let mut point: Vec<f64> = state
                .iter()
                .zip(&shifts)
                .map(|(x, shift)| (x ^ shift) as f64 * scale)
                .collect();
            point.extend(halton(i + 1, dims - tables.len(), 0));
            point
        })
        .collect()
}

/// Cell centers of a near-square lattice, `n` of them in random order.
fn grid<R: Rng + ?Sized>(n: usize, dims: usize, rng: &mut R) -> Vec<Vec<f64>> {
    let mut per_dim = (n as f64).powf(1.0 / dims as f64).floor().max(1.0) as u64;
    while per_dim
        .checked_pow(dims as u32)
        .is_some_and(|total| total < n as u64)
    {
        per_dim += 1;
    }
    let total = per_dim.checked_pow(dims as u32);

    let indices: Vec<u64> = match total {
        Some(total) if total <= MAX_GRID_ENUMERATION => {
            let mut all: Vec<u64> = (0..total).collect();
            all.shuffle(rng);
            all.truncate(n);
            all
        }
        _ => {
            let limit = total.unwrap_or(u64::MAX);
            let mut seen = HashSet::with_capacity(n);
            while seen.len() < n {
                seen.insert(rng.random_range(0..limit));
            }
            let mut picked: Vec<u64> = seen.into_iter().collect();
            picked.sort_unstable();
            picked.shuffle(rng);
            picked
        }
    };

    indices
        .into_iter()
        .map(|mut index| {
            (0..dims)
                .map(|_| {
                    let cell = index % per_dim;
                    index /= per_dim;
                    (cell as f64 + 0.5) / per_dim as f64
                })
                .collect()
        })
        .collect()
}
