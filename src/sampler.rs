use crate::error::{Error, Result};
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use std::cmp::Reverse;
use std::sync::Arc;

/// An ordering of example indices; every call to `sample` starts a fresh pass.
pub trait Sampler {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sample(&self) -> Box<dyn Iterator<Item = usize> + '_>;
}

/// Indices in order, `0..len`.
#[derive(Clone, Copy, Debug, new)]
pub struct SequentialSampler {
    len: usize,
}

impl Sampler for SequentialSampler {
    fn len(&self) -> usize {
        self.len
    }

    fn sample(&self) -> Box<dyn Iterator<Item = usize> + '_> {
        Box::new(0..self.len)
    }
}

/// A fresh random permutation of `0..len` per pass.
#[derive(Clone, Copy, Debug, new)]
pub struct RandomSampler {
    len: usize,
}

impl Sampler for RandomSampler {
    fn len(&self) -> usize {
        self.len
    }

    fn sample(&self) -> Box<dyn Iterator<Item = usize> + '_> {
        let mut indices: Vec<usize> = (0..self.len).collect();
        indices.shuffle(&mut thread_rng());
        Box::new(indices.into_iter())
    }
}

/// Approximately sorted sampling.
///
/// A random permutation is cut into chunks of `chunk_size` and every chunk is
/// sorted by size, ascending for even chunks and descending for odd ones, so
/// neighbouring examples have similar sizes while the order across chunks stays
/// random.
#[derive(Clone, Debug)]
pub struct SortishSampler {
    sizes: Arc<[usize]>,
    chunk_size: usize,
}

impl SortishSampler {
    pub fn new(sizes: impl Into<Arc<[usize]>>, chunk_size: usize) -> Self {
        Self {
            sizes: sizes.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// One pass drawing its permutation from `rng`.
    pub fn iter_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Sortish<'_> {
        let mut permutation: Vec<usize> = (0..self.sizes.len()).collect();
        permutation.shuffle(rng);

        Sortish {
            sizes: &self.sizes,
            permutation,
            chunk_size: self.chunk_size,
            chunk: 0,
            current: Vec::new().into_iter(),
        }
    }
}

impl Sampler for SortishSampler {
    fn len(&self) -> usize {
        self.sizes.len()
    }

    fn sample(&self) -> Box<dyn Iterator<Item = usize> + '_> {
        Box::new(self.iter_with(&mut thread_rng()))
    }
}

/// A single pass of a [`SortishSampler`]; chunks are sorted lazily.
pub struct Sortish<'a> {
    sizes: &'a [usize],
    permutation: Vec<usize>,
    chunk_size: usize,
    chunk: usize,
    current: std::vec::IntoIter<usize>,
}

impl Iterator for Sortish<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if let Some(index) = self.current.next() {
                return Some(index);
            }

            let start = self.chunk * self.chunk_size;
            if start >= self.permutation.len() {
                return None;
            }
            let end = (start + self.chunk_size).min(self.permutation.len());

            let mut chunk = self.permutation[start..end].to_vec();
            let sizes = self.sizes;
            if self.chunk % 2 == 0 {
                chunk.sort_by_key(|&index| sizes[index]);
            } else {
                chunk.sort_by_key(|&index| Reverse(sizes[index]));
            }

            self.chunk += 1;
            self.current = chunk.into_iter();
        }
    }
}

/// Greedy grouping of an index stream into batches.
///
/// A batch is cut before an index whose size would push the running sum over
/// `budget`, or, with a `cost` budget, when `len * max_size^2` of the batch built
/// so far already exceeds it. The max does not include the incoming index yet.
/// An empty batch is never cut, so an oversized example forms a batch of its own.
/// An index without a size ends the pass with [`Error::UnknownExample`].
pub struct Batches<'a, I> {
    sizes: &'a [usize],
    indices: I,
    budget: usize,
    cost: Option<usize>,
    drop_last: bool,
    batch: Vec<usize>,
    sum: usize,
    max: usize,
    failed: bool,
}

impl<'a, I> Batches<'a, I> {
    fn new(sizes: &'a [usize], indices: I, budget: usize, cost: Option<usize>, drop_last: bool) -> Self {
        Self {
            sizes,
            indices,
            budget,
            cost,
            drop_last,
            batch: Vec::new(),
            sum: 0,
            max: 0,
            failed: false,
        }
    }

    fn should_cut(&self, size: usize) -> bool {
        if self.batch.is_empty() {
            return false;
        }
        let over_budget = self.sum.saturating_add(size) > self.budget;
        let over_cost = self.cost.is_some_and(|cost| {
            self.batch
                .len()
                .saturating_mul(self.max)
                .saturating_mul(self.max)
                > cost
        });
        over_budget || over_cost
    }
}

impl<I: Iterator<Item = usize>> Iterator for Batches<'_, I> {
    type Item = Result<Vec<usize>>;

    fn next(&mut self) -> Option<Result<Vec<usize>>> {
        if self.failed {
            return None;
        }

        while let Some(index) = self.indices.next() {
            let Some(&size) = self.sizes.get(index) else {
                self.failed = true;
                self.batch.clear();
                return Some(Err(Error::UnknownExample {
                    index,
                    len: self.sizes.len(),
                }));
            };

            let emitted = if self.should_cut(size) {
                self.sum = 0;
                self.max = 0;
                Some(std::mem::take(&mut self.batch))
            } else {
                None
            };

            self.batch.push(index);
            self.sum = self.sum.saturating_add(size);
            self.max = self.max.max(size);

            if emitted.is_some() {
                return emitted.map(Ok);
            }
        }

        if self.batch.is_empty() || self.drop_last {
            self.batch.clear();
            return None;
        }
        Some(Ok(std::mem::take(&mut self.batch)))
    }
}

fn check_len<S: Sampler>(sizes: &[usize], sampler: &S) -> Result<()> {
    if sizes.len() != sampler.len() {
        return Err(Error::SizeMismatch {
            sizes: sizes.len(),
            sampler: sampler.len(),
        });
    }
    Ok(())
}

/// Groups sampled indices into batches whose sizes sum to at most `budget`.
#[derive(Clone, Debug)]
pub struct LinearBatchSampler<S> {
    sizes: Arc<[usize]>,
    sampler: S,
    budget: usize,
    drop_last: bool,
}

impl<S: Sampler> LinearBatchSampler<S> {
    /// Fails when `sampler` does not cover exactly the examples in `sizes`.
    pub fn new(sizes: impl Into<Arc<[usize]>>, sampler: S, budget: usize, drop_last: bool) -> Result<Self> {
        let sizes = sizes.into();
        check_len(&sizes, &sampler)?;
        Ok(Self {
            sizes,
            sampler,
            budget,
            drop_last,
        })
    }

    /// Groups an explicit index ordering.
    pub fn batches<I>(&self, indices: I) -> Batches<'_, I::IntoIter>
    where
        I: IntoIterator<Item = usize>,
    {
        Batches::new(&self.sizes, indices.into_iter(), self.budget, None, self.drop_last)
    }

    /// One pass over a fresh ordering from the inner sampler.
    pub fn iter(&self) -> Batches<'_, Box<dyn Iterator<Item = usize> + '_>> {
        self.batches(self.sampler.sample())
    }
}

/// Like [`LinearBatchSampler`], additionally bounding `len * max_size^2` of a
/// batch by `cost`, which approximates attention-style costs.
#[derive(Clone, Debug)]
pub struct QuadraticBatchSampler<S> {
    sizes: Arc<[usize]>,
    sampler: S,
    budget: usize,
    cost: usize,
    drop_last: bool,
}

impl<S: Sampler> QuadraticBatchSampler<S> {
    pub fn new(
        sizes: impl Into<Arc<[usize]>>,
        sampler: S,
        budget: usize,
        cost: usize,
        drop_last: bool,
    ) -> Result<Self> {
        let sizes = sizes.into();
        check_len(&sizes, &sampler)?;
        Ok(Self {
            sizes,
            sampler,
            budget,
            cost,
            drop_last,
        })
    }

    pub fn batches<I>(&self, indices: I) -> Batches<'_, I::IntoIter>
    where
        I: IntoIterator<Item = usize>,
    {
        Batches::new(
            &self.sizes,
            indices.into_iter(),
            self.budget,
            Some(self.cost),
            self.drop_last,
        )
    }

    pub fn iter(&self) -> Batches<'_, Box<dyn Iterator<Item = usize> + '_>> {
        self.batches(self.sampler.sample())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sorted(mut indices: Vec<usize>) -> Vec<usize> {
        indices.sort_unstable();
        indices
    }

    #[test]
    fn test_sortish_single_chunk_is_sorted() {
        let sizes = vec![5, 1, 4, 2, 3];
        let sampler = SortishSampler::new(sizes.clone(), 10);
        let mut rng = StdRng::seed_from_u64(42);

        let indices: Vec<usize> = sampler.iter_with(&mut rng).collect();
        assert_eq!(indices, vec![1, 3, 4, 2, 0]);
    }

    #[test]
    fn test_sortish_chunks_alternate() {
        let sizes: Vec<usize> = (0..9).map(|i| (i * 7) % 10).collect();
        let sampler = SortishSampler::new(sizes.clone(), 3);
        let mut rng = StdRng::seed_from_u64(7);

        let indices: Vec<usize> = sampler.iter_with(&mut rng).collect();
        assert_eq!(sorted(indices.clone()), (0..9).collect::<Vec<_>>());

        for (k, chunk) in indices.chunks(3).enumerate() {
            let chunk_sizes: Vec<usize> = chunk.iter().map(|&i| sizes[i]).collect();
            let mut expected = chunk_sizes.clone();
            expected.sort_unstable();
            if k % 2 == 1 {
                expected.reverse();
            }
            assert_eq!(chunk_sizes, expected);
        }
    }

    #[test]
    fn test_sortish_is_restartable() {
        let sampler = SortishSampler::new(vec![1; 20], 4);
        assert_eq!(sampler.len(), 20);
        assert_eq!(sorted(sampler.sample().collect()), (0..20).collect::<Vec<_>>());
        assert_eq!(sorted(sampler.sample().collect()), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_random_sampler_is_a_permutation() {
        let sampler = RandomSampler::new(50);
        assert_eq!(sampler.len(), 50);
        assert_eq!(sorted(sampler.sample().collect()), (0..50).collect::<Vec<_>>());
        assert!(RandomSampler::new(0).is_empty());
    }

    #[test]
    fn test_sampler_must_match_sizes() {
        let linear = LinearBatchSampler::new(vec![5, 5], SequentialSampler::new(4), 6, false);
        assert!(matches!(linear, Err(Error::SizeMismatch { sizes: 2, sampler: 4 })));

        let quadratic = QuadraticBatchSampler::new(vec![5, 5], RandomSampler::new(1), 6, 10, false);
        assert!(matches!(quadratic, Err(Error::SizeMismatch { sizes: 2, sampler: 1 })));
    }

    #[test]
    fn test_unknown_index_ends_the_pass() {
        let sampler = LinearBatchSampler::new(vec![5, 5], SequentialSampler::new(2), 6, false).unwrap();
        let mut batches = sampler.batches([0, 1, 2, 3]);

        assert_eq!(batches.next().unwrap().unwrap(), vec![0]);
        assert!(matches!(batches.next(), Some(Err(Error::UnknownExample { index: 2, len: 2 }))));
        assert!(batches.next().is_none());
    }

    #[test]
    fn test_huge_sizes_do_not_overflow() {
        let sizes = vec![usize::MAX / 2, 1, usize::MAX];
        let sampler =
            QuadraticBatchSampler::new(sizes, SequentialSampler::new(3), usize::MAX, usize::MAX - 1, false)
                .unwrap();

        let batches: Vec<Vec<usize>> = sampler.iter().collect::<Result<_>>().unwrap();
        assert_eq!(batches, vec![vec![0], vec![1, 2]]);
    }

    #[test]
    fn test_linear_grouping() {
        let sizes = vec![3, 4, 2, 5];
        let sampler = LinearBatchSampler::new(sizes, SequentialSampler::new(4), 6, false).unwrap();

        let batches: Vec<Vec<usize>> = sampler.iter().collect::<Result<_>>().unwrap();
        assert_eq!(batches, vec![vec![0], vec![1, 2], vec![3]]);
    }

    #[test]
    fn test_linear_drop_last() {
        let sizes = vec![3, 4, 2, 5];
        let sampler = LinearBatchSampler::new(sizes, SequentialSampler::new(4), 6, true).unwrap();

        let batches: Vec<Vec<usize>> = sampler.iter().collect::<Result<_>>().unwrap();
        assert_eq!(batches, vec![vec![0], vec![1, 2]]);
    }

    #[test]
    fn test_oversized_example_is_emitted_alone() {
        let sizes = vec![10, 1, 1];
        let sampler = LinearBatchSampler::new(sizes, SequentialSampler::new(3), 4, false).unwrap();

        let batches: Vec<Vec<usize>> = sampler.iter().collect::<Result<_>>().unwrap();
        assert_eq!(batches, vec![vec![0], vec![1, 2]]);
    }

    #[test]
    fn test_grouping_keeps_given_order() {
        let sizes = vec![1, 1, 1, 1];
        let sampler = LinearBatchSampler::new(sizes, SequentialSampler::new(4), 2, false).unwrap();

        let batches: Vec<Vec<usize>> = sampler.batches([3, 1, 0, 2]).collect::<Result<_>>().unwrap();
        assert_eq!(batches, vec![vec![3, 1], vec![0, 2]]);
    }

    #[test]
    fn test_quadratic_uses_max_before_candidate() {
        // After [0, 1] the check sees 2 * 3^2 = 18 > 10; the candidate's size
        // of 1 plays no part in it.
        let sizes = vec![3, 3, 1, 1];
        let sampler = QuadraticBatchSampler::new(sizes, SequentialSampler::new(4), 100, 10, false).unwrap();

        let batches: Vec<Vec<usize>> = sampler.iter().collect::<Result<_>>().unwrap();
        assert_eq!(batches, vec![vec![0, 1], vec![2, 3]]);

        // A large candidate joining a batch of small ones is not cut by cost.
        let sizes = vec![1, 1, 9];
        let sampler = QuadraticBatchSampler::new(sizes, SequentialSampler::new(3), 100, 10, false).unwrap();
        let batches: Vec<Vec<usize>> = sampler.iter().collect::<Result<_>>().unwrap();
        assert_eq!(batches, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_quadratic_cuts_no_later_than_linear() {
        let sizes: Vec<usize> = vec![2, 7, 3, 3, 8, 1, 1, 4, 6, 2, 5, 5];
        let n = sizes.len();
        let linear = LinearBatchSampler::new(sizes.clone(), SequentialSampler::new(n), 12, false).unwrap();
        let quadratic = QuadraticBatchSampler::new(sizes, SequentialSampler::new(n), 12, 40, false).unwrap();

        let linear: Vec<Vec<usize>> = linear.iter().collect::<Result<_>>().unwrap();
        let quadratic: Vec<Vec<usize>> = quadratic.iter().collect::<Result<_>>().unwrap();
        assert!(quadratic.len() >= linear.len());
        assert!(quadratic[0].len() <= linear[0].len());
        assert_eq!(quadratic.concat(), (0..n).collect::<Vec<_>>());
    }
}
