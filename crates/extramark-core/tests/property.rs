use std::panic;

use extramark_core::{Options, Transform};

const CASES: usize = 300;
const MAX_LEN: usize = 512;
const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789 \
\n\t#*`$[](){}!<>:+-_=./\\\\\"'|&^~@";

#[test]
fn transform_never_panics_on_random_input() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = Lcg::new(0x7f4a_2d91_13b4_55a1);
    for case in 0..CASES {
        let len = rng.gen_range(0, MAX_LEN + 1);
        let source = random_string(&mut rng, len);
        let extra = case % 2 == 0;
        let safe = case % 3 == 0;
        let result = panic::catch_unwind(|| {
            let mut options = Options::default();
            options.extra_mode = extra;
            options.safe_mode = safe;
            Transform::new(options).transform(&source)
        });
        if result.is_err() {
            return Err(format!(
                "transform panicked for case {} (extra={}, safe={}): {:?}",
                case, extra, safe, source
            )
            .into());
        }
    }
    Ok(())
}

#[test]
fn transforms_are_deterministic_and_reset_state() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = Lcg::new(0x91d4_2f8e_c1a3_044f);
    let mut options = Options::default();
    options.extra_mode = true;
    let mut reused = Transform::new(options.clone());
    for case in 0..CASES {
        let len = rng.gen_range(0, MAX_LEN + 1);
        let source = random_string(&mut rng, len);
        // A reused instance must behave exactly like a fresh one.
        let repeated = reused.transform(&source);
        let fresh = Transform::new(options.clone()).transform(&source);
        if repeated != fresh {
            return Err(format!(
                "state leaked across transforms for case {}: {:?}",
                case, source
            )
            .into());
        }
    }
    Ok(())
}

#[test]
fn safe_mode_never_emits_script_tags() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = Lcg::new(0x1357_9bdf_2468_ace0);
    let mut options = Options::default();
    options.safe_mode = true;
    options.extra_mode = true;
    for case in 0..CASES {
        let len = rng.gen_range(0, MAX_LEN / 2);
        let mut source = random_string(&mut rng, len);
        // The charset is ASCII, so any index is a char boundary.
        let insert = rng.gen_range(0, source.len() + 1);
        source.insert_str(insert, "<script>alert(1)</script>");
        let html = Transform::new(options.clone()).transform(&source);
        if html.contains("<script") {
            return Err(format!("unescaped script for case {}: {:?}", case, source).into());
        }
    }
    Ok(())
}

fn random_string(rng: &mut Lcg, len: usize) -> String {
    let mut out = String::with_capacity(len);
    for _ in 0..len {
        let idx = rng.gen_range(0, CHARSET.len());
        let byte = CHARSET.get(idx).copied().unwrap_or(b' ');
        out.push(byte as char);
    }
    out
}

struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        self.state
    }

    fn gen_range(&mut self, min: usize, max: usize) -> usize {
        if max <= min {
            return min;
        }
        let span = max - min;
        let value = (self.next() >> 1) as usize;
        min + (value % span)
    }
}
