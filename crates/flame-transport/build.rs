fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/frontend.proto");

    tonic_build::configure()
        .build_server(false)
        .bytes(["."])
        .compile_protos(&["proto/frontend.proto"], &["proto"])?;

    Ok(())
}
