/// Generates the gRPC client and server bindings for `proto/ordbok.proto`.
///
/// Besides the message types and the `Ordbok` service traits, the build also
/// writes an encoded file descriptor set (`ordbok_descriptor.bin`) to
/// `OUT_DIR`, which the server registers with `tonic-reflection`.
///
/// Generated code is pulled in with:
///
/// ```rust,ignore
/// pub mod proto {
///     tonic::include_proto!("ordbok");
/// }
/// ```
///
/// # Panics
///
/// Panics if `OUT_DIR` is unset or code generation fails.
use std::env;
use std::path::PathBuf;
fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("ordbok_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/ordbok.proto"], &["proto"])
        .unwrap();
}
