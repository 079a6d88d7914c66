//! End-to-end runs against a local docker daemon.
//!
//! Run with `cargo test -- --ignored` on a host where the profile images are pulled.

use tortoise::{EngineConfig, Judge, JudgeRequest, RunRequest, TestCase, Verdict};

fn judge() -> Judge {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Judge::docker(EngineConfig::from_env().unwrap()).unwrap()
}

fn case(input: &str, expected: &str) -> TestCase {
    TestCase {
        input: input.into(),
        expected_output: expected.into(),
    }
}

#[tokio::test]
#[ignore]
async fn python_reverse() {
    let request = JudgeRequest::new("python", "print(input()[::-1])", vec![case("abc\n", "cba")]);
    let result = judge().judge(&request).await.unwrap();
    assert_eq!(result.verdict, Verdict::Accepted);
    assert_eq!(result.tests[0].index, 0);
}

#[tokio::test]
#[ignore]
async fn cpp_sum() {
    let source = r#"
        #include <iostream>
        int main() { long a, b; std::cin >> a >> b; std::cout << a + b << std::endl; }
    "#;
    let request = JudgeRequest::new("cpp", source, vec![case("1 2\n", "3"), case("40 2\n", "42")]);
    let result = judge().judge(&request).await.unwrap();
    assert_eq!(result.verdict, Verdict::Accepted);
    assert_eq!(result.tests.len(), 2);
}

#[tokio::test]
#[ignore]
async fn cpp_compile_error() {
    let request = JudgeRequest::new("cpp", "int main( {", vec![case("", "")]);
    let result = judge().judge(&request).await.unwrap();
    assert_eq!(result.verdict, Verdict::CompileError);
    assert!(result.tests.is_empty());
    assert!(!result.compile_stderr.unwrap().is_empty());
}

#[tokio::test]
#[ignore]
async fn python_infinite_loop() {
    let mut request = JudgeRequest::new("python", "while True: pass", vec![case("", "")]);
    request.time_limit_ms = 500;
    let result = judge().judge(&request).await.unwrap();
    assert_eq!(result.verdict, Verdict::TimeLimitExceeded);
}

#[tokio::test]
#[ignore]
async fn no_network() {
    let source = "import urllib.request\nurllib.request.urlopen('http://example.com', timeout=2)";
    let request = JudgeRequest::new("python", source, vec![case("", "")]);
    let result = judge().judge(&request).await.unwrap();
    assert_eq!(result.verdict, Verdict::RuntimeError);
}

#[tokio::test]
#[ignore]
async fn free_run_java() {
    let source = r#"
        public class Main {
            public static void main(String[] args) { System.out.println("hi"); }
        }
    "#;
    let result = judge().run_code(&RunRequest::new("java", source)).await.unwrap();
    assert_eq!(result.stdout, "hi\n");
    assert_eq!(result.error, None);
}
