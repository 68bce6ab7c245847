fn main() {
	println!("cargo:rerun-if-changed=csrc/shim.c");

	cc::Build::new()
		.file("csrc/shim.c")
		.warnings(true)
		.opt_level(2)
		.compile("boxlink_sim_shim");
}
