use rand::distributions::uniform::SampleUniform;
use rand::{
    distributions::{Distribution, Uniform},
    thread_rng, Rng,
};

/// Generates a random integer within a specified range.
///
/// # Arguments
///
/// * `min` - The minimum value of the integer (inclusive).
/// * `max` - The maximum value of the integer (inclusive).
pub fn gen_random_int<T>(min: T, max: T) -> T
where
    T: SampleUniform,
{
    let mut rng = thread_rng();
    Uniform::new_inclusive(min, max).sample(&mut rng)
}

/// Returns true with probability `p` (clamped to [0, 1]).
pub fn gen_random_bool(p: f64) -> bool {
    thread_rng().gen_bool(p.clamp(0.0, 1.0))
}

pub fn gen_random_permutation<T>(mut vec: Vec<T>) -> Vec<T> {
    let len = vec.len();
    for i in 0..len {
        let j = gen_random_int(i, len - 1);
        vec.swap(i, j);
    }
    vec
}
