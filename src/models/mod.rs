pub mod todo;
pub mod todo_history;
pub mod user;

pub use todo::{
    CreateTodoRequest, NewTodo, Todo, TodoChanges, TodoFilter, TodoListQuery, TodoPage, TodoPriority,
    UpdateTodoRequest,
};
pub use todo_history::TodoHistory;
pub use user::{User, UserProfile};
