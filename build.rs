fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &["proto/channel_creation/v1/channel_creation.proto"],
            &["proto"],
        )?;

    Ok(())
}
