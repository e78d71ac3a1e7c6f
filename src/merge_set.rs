//! Sorted-set union over particle id lists.
//!
//! Inputs are ascending and duplicate-free. A list may end early with
//! [`EMPTY_SLOT`], which is how partially filled grid cells look when read
//! as raw slot arrays; everything from the first `EMPTY_SLOT` on is ignored.

pub const EMPTY_SLOT: usize = usize::MAX;

fn live(ids: &[usize]) -> &[usize] {
    match ids.iter().position(|&id| id == EMPTY_SLOT) {
        Some(end) => &ids[..end],
        None => ids,
    }
}

fn merge_with<F>(a: &[usize], b: &[usize], mut emit: F) -> usize
where
    F: FnMut(usize) -> bool,
{
    let a = live(a);
    let b = live(b);
    let (mut i, mut j) = (0, 0);
    let mut written = 0;

    while i < a.len() && j < b.len() {
        let next = match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                i += 1;
                a[i - 1]
            }
            std::cmp::Ordering::Greater => {
                j += 1;
                b[j - 1]
            }
            std::cmp::Ordering::Equal => {
                i += 1;
                j += 1;
                a[i - 1]
            }
        };
        if !emit(next) {
            return written;
        }
        written += 1;
    }

    for &id in a[i..].iter().chain(&b[j..]) {
        if !emit(id) {
            return written;
        }
        written += 1;
    }
    written
}

/// Writes the union of `a` and `b` into `out` and returns the number of ids
/// written. Output stops early if `out` is full.
pub fn merge(a: &[usize], b: &[usize], out: &mut [usize]) -> usize {
    let mut cursor = 0;
    merge_with(a, b, |id| {
        if cursor == out.len() {
            return false;
        }
        out[cursor] = id;
        cursor += 1;
        true
    })
}

/// Appends the union of `a` and `b` to `out`, returning how many ids were
/// appended.
pub fn merge_into(a: &[usize], b: &[usize], out: &mut Vec<usize>) -> usize {
    out.reserve(a.len() + b.len());
    merge_with(a, b, |id| {
        out.push(id);
        true
    })
}

#[cfg(test)]
mod tests {
    use super::{merge, merge_into, EMPTY_SLOT};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::collections::BTreeSet;

    fn run(a: &[usize], b: &[usize]) -> Vec<usize> {
        let mut out = vec![0; a.len() + b.len()];
        let n = merge(a, b, &mut out);
        out.truncate(n);
        out
    }

    #[test]
    fn merges_interleaved_lists() {
        assert_eq!(run(&[1, 4, 9], &[2, 4, 10, 11]), vec![1, 2, 4, 9, 10, 11]);
    }

    #[test]
    fn empty_inputs() {
        assert_eq!(run(&[], &[3, 5]), vec![3, 5]);
        assert_eq!(run(&[3, 5], &[]), vec![3, 5]);
        assert!(run(&[], &[]).is_empty());
    }

    #[test]
    fn stops_at_empty_slot() {
        let a = [1, 3, EMPTY_SLOT, 0, 0];
        let b = [2, EMPTY_SLOT, 99];
        assert_eq!(run(&a, &b), vec![1, 2, 3]);
    }

    #[test]
    fn bounded_by_explicit_length() {
        let a = [1, 3, 5, 7];
        let b = [2, 4, 6, 8];
        assert_eq!(run(&a[..2], &b[..1]), vec![1, 2, 3]);
    }

    #[test]
    fn truncates_when_output_is_full() {
        let mut out = [0; 2];
        assert_eq!(merge(&[1, 2, 3], &[4], &mut out), 2);
        assert_eq!(out, [1, 2]);
    }

    fn random_sorted(rng: &mut ChaCha8Rng) -> Vec<usize> {
        let len = rng.gen_range(0..20);
        let set: BTreeSet<usize> = (0..len).map(|_| rng.gen_range(0..40)).collect();
        set.into_iter().collect()
    }

    #[test]
    fn matches_set_union_on_random_lists() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..200 {
            let a = random_sorted(&mut rng);
            let mut b = random_sorted(&mut rng);
            let union: BTreeSet<usize> = a.iter().chain(&b).copied().collect();
            let expected: Vec<usize> = union.into_iter().collect();

            assert_eq!(run(&a, &b), expected);

            b.push(EMPTY_SLOT);
            b.push(3);
            let mut appended = vec![42];
            let n = merge_into(&a, &b, &mut appended);
            assert_eq!(n, expected.len());
            assert_eq!(&appended[1..], expected.as_slice());
        }
    }
}
