fn main() {
    // Compile the platform registration service and the module-side contract.
    tonic_build::configure()
        .compile_protos(
            &["proto/registration.proto", "proto/module.proto"],
            &["proto"],
        )
        .unwrap();
}
