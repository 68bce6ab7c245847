fn main() {
	println!("cargo:rerun-if-changed=csrc/invoke.c");

	cc::Build::new()
		.file("csrc/invoke.c")
		.warnings(true)
		.opt_level(2)
		.compile("boxlink_invoke");
}
