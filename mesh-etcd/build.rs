// Compiles the vendored etcd v3 subset (proto/etcd.proto) into the KV and
// Watch client/server stubs the façade serves.
fn main() -> Result<(), Box<dyn std::error::Error>> {
	if std::env::var_os("PROTOC").is_none() {
		unsafe {
			std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
		}
	}

	let proto_file = std::env::current_dir()?.join("proto/etcd.proto");
	let include_dir = std::env::current_dir()?.join("proto");

	tonic_build::configure()
		.build_server(true)
		.build_client(false)
		.compile_protos(&[proto_file.to_str().unwrap()], &[include_dir.to_str().unwrap()])?;

	println!("cargo:rerun-if-changed={}", proto_file.to_str().unwrap());
	Ok(())
}
