use std::env;

// Vector back-ends this crate knows how to target
#[derive(PartialEq, Eq, Debug)]
struct VectorBackend {
    target_arch: &'static str,
    target_feature: &'static str,
    cfg_flag: &'static str,
}

impl VectorBackend {
    // Groups all back-ends with a native micro-kernel implementation.
    // Only AArch64 exposes NEON intrinsics on stable Rust; 32-bit ARM targets
    // run the 6x8 and 4x8 kernels through the portable vector type.
    fn backends() -> Vec<VectorBackend> {
        vec![VectorBackend {
            target_arch: "aarch64",
            target_feature: "neon",
            cfg_flag: "neon",
        }]
    }

    fn is_enabled(&self, target_arch: &str, target_features: &[&str]) -> bool {
        self.target_arch == target_arch && target_features.contains(&self.target_feature)
    }
}

struct TargetDetector;
impl TargetDetector {
    fn forced_portable() -> bool {
        matches!(
            env::var("PACKED_SGEMM_PORTABLE").as_deref(),
            Ok("1") | Ok("true") | Ok("yes")
        )
    }

    fn apply(backends: &[VectorBackend]) {
        // Cargo describes the *target* here, so cross builds pick the right path.
        let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
        let target_features = env::var("CARGO_CFG_TARGET_FEATURE").unwrap_or_default();
        let target_features: Vec<&str> = target_features.split(',').collect();

        let cfg_flag = if Self::forced_portable() {
            "fallback"
        } else {
            backends
                .iter()
                .find(|backend| backend.is_enabled(&target_arch, &target_features))
                .map(|backend| backend.cfg_flag)
                .unwrap_or("fallback")
        };

        println!("applying: {cfg_flag}");

        println!("cargo:rustc-cfg={cfg_flag}");

        println!("cargo::rustc-check-cfg=cfg(neon)");
        println!("cargo::rustc-check-cfg=cfg(fallback)");
    }
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=PACKED_SGEMM_PORTABLE");

    TargetDetector::apply(&VectorBackend::backends());
}
